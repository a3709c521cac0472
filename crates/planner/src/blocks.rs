use shared::{
    domain::{Block, BlockId, Format},
    error::WorkflowError,
};
use tracing::warn;

/// Devices list blocks newest first; only this many are considered by default.
pub const DEFAULT_SCAN_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSelection {
    pub block: Block,
    /// Other blocks within the scan window carrying the same tag.
    pub other_matches: Vec<BlockId>,
}

impl BlockSelection {
    pub fn is_ambiguous(&self) -> bool {
        !self.other_matches.is_empty()
    }
}

/// Picks the block set up for `format` among the first `scan_limit` blocks.
///
/// A block whose title carries both tags is set up for neither format.
///
/// More than one match is unexpected on a correctly configured device; the
/// lowest identifier is used and the others are returned so the caller can
/// report them.
pub fn select_block(
    format: Format,
    blocks: &[Block],
    scan_limit: usize,
) -> Result<BlockSelection, WorkflowError> {
    let mut matches: Vec<&Block> = blocks
        .iter()
        .take(scan_limit)
        .filter(|block| block.suffix_tag() == Some(format))
        .collect();
    matches.sort_by_key(|block| block.id);

    let mut matches = matches.into_iter();
    let block = matches
        .next()
        .cloned()
        .ok_or(WorkflowError::NoMatchingBlock { format })?;
    let other_matches: Vec<BlockId> = matches.map(|block| block.id).collect();

    if !other_matches.is_empty() {
        warn!(
            %format,
            chosen = block.id.0,
            others = ?other_matches,
            "planner: several blocks carry the same format tag, using the lowest id"
        );
    }

    Ok(BlockSelection {
        block,
        other_matches,
    })
}
