use crate::buffer::StreamBuffer;
use crate::part::PartBuilder;
use crate::BodyPart;

#[derive(Debug)]
pub(crate) struct MultipartState {
    pub(crate) buffer: StreamBuffer,
    pub(crate) boundary: String,
    pub(crate) stage: StreamingStage,
    pub(crate) depth: usize,
    pub(crate) next_field_idx: usize,
    pub(crate) curr_part: Option<PartBuilder>,
    pub(crate) curr_field_size_limit: u64,
    pub(crate) parts: Vec<BodyPart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamingStage {
    FindingFirstBoundary,
    ReadingBoundary,
    DeterminingBoundaryType,
    ReadingTransportPadding,
    ReadingFieldHeaders,
    ReadingFieldData,
    Eof,
    Failed,
}
