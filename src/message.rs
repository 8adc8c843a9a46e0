use crate::BodyPart;
use std::ops::Index;
use std::slice;

/// The parts of one decoded multipart body, in wire order.
///
/// Spooled part storage is released when the message, or the part taken out of
/// it, is dropped.
#[derive(Debug, Default)]
pub struct MultipartMessage {
    boundary: String,
    parts: Vec<BodyPart>,
}

impl MultipartMessage {
    pub(crate) fn new(boundary: String, parts: Vec<BodyPart>) -> Self {
        MultipartMessage { boundary, parts }
    }

    /// The boundary the message was decoded with.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&BodyPart> {
        self.parts.get(idx)
    }

    /// First part with the given field name.
    pub fn part_by_name(&self, name: &str) -> Option<&BodyPart> {
        self.parts.iter().find(|part| part.name() == Some(name))
    }

    pub fn iter(&self) -> slice::Iter<'_, BodyPart> {
        self.parts.iter()
    }

    pub fn into_parts(self) -> Vec<BodyPart> {
        self.parts
    }
}

impl Index<usize> for MultipartMessage {
    type Output = BodyPart;

    fn index(&self, idx: usize) -> &BodyPart {
        &self.parts[idx]
    }
}

impl IntoIterator for MultipartMessage {
    type Item = BodyPart;
    type IntoIter = std::vec::IntoIter<BodyPart>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.into_iter()
    }
}

impl<'a> IntoIterator for &'a MultipartMessage {
    type Item = &'a BodyPart;
    type IntoIter = slice::Iter<'a, BodyPart>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}
