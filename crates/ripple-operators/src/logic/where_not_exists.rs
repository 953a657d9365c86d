use ripple_batch::{EventKind, SyncTime};

use crate::lane::{InputEvent, LaneContext};
use crate::logic::Logic;
use crate::output::OutPayload;
use crate::{OperatorKind, Side};

/// Produces the left intervals that no right interval with the same key
/// overlaps.
///
/// A left interval is held until its end. It is discarded if a right
/// interval is alive when it starts, or if one starts before it ends. There
/// is no retraction: a right interval arriving after the left interval was
/// produced has no effect.
#[derive(Debug)]
pub(crate) struct WhereNotExistsLogic;

impl Logic for WhereNotExistsLogic {
    fn kind(&self) -> OperatorKind {
        OperatorKind::WhereNotExists
    }

    fn on_event<P: Clone>(&self, ctx: &mut LaneContext<'_, P>, side: Side, event: InputEvent<P>) {
        let InputEvent {
            kind,
            key,
            sync_time,
            other_time,
            payload,
        } = event;
        let end = if kind == EventKind::Start {
            SyncTime::INFINITY
        } else {
            other_time
        };

        match (side, kind) {
            (Side::Right, EventKind::End) => {
                if let Some(id) = ctx.find_open(Side::Right, key, other_time, &payload) {
                    ctx.remove(key, id);
                }
            }
            (Side::Right, _) => {
                ctx.insert(Side::Right, key, sync_time, end, payload, false);
                for id in ctx.entries_of(key, Side::Left) {
                    ctx.remove(key, id);
                }
            }
            (Side::Left, EventKind::End) => {
                let Some(id) = ctx.find_open(Side::Left, key, other_time, &payload) else {
                    return;
                };
                if let Some(entry) = ctx.remove(key, id) {
                    ctx.emit(
                        EventKind::Interval,
                        key,
                        entry.start,
                        sync_time,
                        OutPayload::Single(entry.payload),
                    );
                }
            }
            (Side::Left, _) => {
                if ctx.entries_of(key, Side::Right).is_empty() {
                    ctx.insert(Side::Left, key, sync_time, end, payload, true);
                }
            }
        }
    }

    fn on_retire<P: Clone>(&self, ctx: &mut LaneContext<'_, P>, key: u64, id: u64) {
        if let Some(entry) = ctx.remove(key, id) {
            if entry.side == Side::Left {
                ctx.emit(
                    EventKind::Interval,
                    key,
                    entry.start,
                    entry.end,
                    OutPayload::Single(entry.payload),
                );
            }
        }
    }

    fn on_end_of_stream<P: Clone>(&self, ctx: &mut LaneContext<'_, P>) {
        for (key, id) in ctx.held_open() {
            if let Some(entry) = ctx.remove(key, id) {
                ctx.emit(
                    EventKind::Start,
                    key,
                    entry.start,
                    SyncTime::INFINITY,
                    OutPayload::Single(entry.payload),
                );
            }
        }
    }
}
