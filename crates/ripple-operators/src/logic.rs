//! The per-event behavior of each operator.
//!
//! [BinaryOperator](crate::binary::BinaryOperator) merges the inputs of a
//! lane in time order and calls the logic for each event, for each interval
//! that reaches its end, and once when both inputs are complete. Within a
//! time step, end edges are delivered before other events, and left events
//! before right events.

mod clip;
mod join;
mod union;
mod where_not_exists;

pub(crate) use clip::*;
pub(crate) use join::*;
pub(crate) use union::*;
pub(crate) use where_not_exists::*;

use crate::lane::{InputEvent, LaneContext};
use crate::{OperatorKind, Side};

pub(crate) trait Logic: Send + Sync + std::fmt::Debug + 'static {
    fn kind(&self) -> OperatorKind;

    fn on_event<P: Clone>(&self, ctx: &mut LaneContext<'_, P>, side: Side, event: InputEvent<P>);

    /// Called when the interval of the entry with the given id ends.
    fn on_retire<P: Clone>(&self, ctx: &mut LaneContext<'_, P>, key: u64, id: u64) {
        ctx.remove(key, id);
    }

    /// Called once both inputs of the lane are complete. Entries that remain
    /// afterwards are dropped.
    fn on_end_of_stream<P: Clone>(&self, _ctx: &mut LaneContext<'_, P>) {}
}
