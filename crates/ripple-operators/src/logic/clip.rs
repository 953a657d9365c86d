use ripple_batch::{EventKind, SyncTime};

use crate::lane::{InputEvent, LaneContext};
use crate::logic::Logic;
use crate::output::OutPayload;
use crate::{OperatorKind, Side};

/// Truncates each left interval at the first right event with the same key
/// that starts strictly inside it.
///
/// Left start edges are passed through immediately and closed by the clip.
/// Left intervals are held until they are clipped or reach their end.
#[derive(Debug)]
pub(crate) struct ClipLogic;

impl Logic for ClipLogic {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Clip
    }

    fn on_event<P: Clone>(&self, ctx: &mut LaneContext<'_, P>, side: Side, event: InputEvent<P>) {
        let InputEvent {
            kind,
            key,
            sync_time,
            other_time,
            payload,
        } = event;

        match (side, kind) {
            (Side::Right, EventKind::End) => {}
            (Side::Right, _) => {
                for id in ctx.entries_of(key, Side::Left) {
                    let clipped = ctx.entry(key, id).map_or(false, |entry| entry.start < sync_time);
                    if !clipped {
                        continue;
                    }
                    let Some(entry) = ctx.remove(key, id) else {
                        continue;
                    };
                    if entry.is_open() {
                        ctx.emit(
                            EventKind::End,
                            key,
                            sync_time,
                            entry.start,
                            OutPayload::Single(entry.payload),
                        );
                    } else {
                        ctx.emit(
                            EventKind::Interval,
                            key,
                            entry.start,
                            sync_time,
                            OutPayload::Single(entry.payload),
                        );
                    }
                }
            }
            (Side::Left, EventKind::End) => {
                let Some(id) = ctx.find_open(Side::Left, key, other_time, &payload) else {
                    tracing::trace!("Ignoring unmatched end edge at {sync_time}");
                    return;
                };
                if let Some(entry) = ctx.remove(key, id) {
                    ctx.emit(
                        EventKind::End,
                        key,
                        sync_time,
                        entry.start,
                        OutPayload::Single(entry.payload),
                    );
                }
            }
            (Side::Left, EventKind::Start) => {
                ctx.emit(
                    EventKind::Start,
                    key,
                    sync_time,
                    SyncTime::INFINITY,
                    OutPayload::Single(payload.clone()),
                );
                ctx.insert(
                    Side::Left,
                    key,
                    sync_time,
                    SyncTime::INFINITY,
                    payload,
                    false,
                );
            }
            (Side::Left, _) => {
                ctx.insert(Side::Left, key, sync_time, other_time, payload, true);
            }
        }
    }

    fn on_retire<P: Clone>(&self, ctx: &mut LaneContext<'_, P>, key: u64, id: u64) {
        if let Some(entry) = ctx.remove(key, id) {
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
