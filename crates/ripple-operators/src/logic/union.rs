use crate::lane::{InputEvent, LaneContext};
use crate::logic::Logic;
use crate::output::OutPayload;
use crate::{OperatorKind, Side};

#[derive(Debug)]
pub(crate) struct UnionLogic;

impl Logic for UnionLogic {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Union
    }

    fn on_event<P: Clone>(&self, ctx: &mut LaneContext<'_, P>, _side: Side, event: InputEvent<P>) {
        ctx.emit(
            event.kind,
            event.key,
            event.sync_time,
            event.other_time,
            OutPayload::Single(event.payload),
        );
    }
}
