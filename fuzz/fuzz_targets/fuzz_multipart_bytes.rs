#![no_main]

use connector_mime::{Constraints, MultipartDecoder, StoragePolicy};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let (split, body) = match data.split_first() {
        Some((split, body)) => (*split as usize + 1, body),
        None => return,
    };

    let constraints = Constraints::new()
        .storage_policy(StoragePolicy::Threshold(16))
        .max_nesting_depth(4);
    let mut decoder = MultipartDecoder::with_constraints("X-BOUNDARY", constraints);

    for chunk in body.chunks(split) {
        if decoder.feed(chunk).is_err() {
            return;
        }
    }

    if let Ok(message) = decoder.finish() {
        for part in &message {
            let _ = part.text();
        }
    }
});
