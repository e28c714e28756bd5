/*! Initial window placement. */

use crate::types::{AppMetadata, Position};

/// Where a window opens.
///
/// A fixed window with an anchored default keeps that anchor even when an
/// absolute position was persisted earlier, so a layout change cannot leave it
/// stranded. Otherwise the persisted position wins over the default.
pub(super) fn initial_position(meta: &AppMetadata, persisted: Option<Position>) -> Position {
  if meta.fixed && meta.position.is_anchored() {
    return meta.position;
  }
  persisted.unwrap_or(meta.position)
}
