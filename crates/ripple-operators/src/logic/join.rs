use ripple_batch::{EventKind, SyncTime};

use crate::lane::{InputEvent, LaneContext};
use crate::logic::Logic;
use crate::output::OutPayload;
use crate::{JoinKind, OperatorKind, Side};

/// Joins intervals with the same key.
///
/// Each pair of overlapping intervals produces the intersection. If either
/// side is an open start edge, the match is produced as a start edge and
/// closed when either interval ends.
#[derive(Debug)]
pub(crate) struct JoinLogic {
    kind: JoinKind,
}

impl JoinLogic {
    pub fn new(kind: JoinKind) -> Self {
        Self { kind }
    }

    fn retire<P: Clone>(&self, ctx: &mut LaneContext<'_, P>, key: u64, id: u64, end: SyncTime) {
        let Some(side) = ctx.entry(key, id).map(|entry| entry.side) else {
            return;
        };
        for (left, right, start) in ctx.take_matches(side, id) {
            if let Some(payload) = pair(ctx, key, left, right) {
                ctx.emit(EventKind::End, key, end, start, payload);
            }
        }

        if let Some(entry) = ctx.remove(key, id) {
            if self.kind == JoinKind::LeftOuter && entry.side == Side::Left && !entry.matched {
                ctx.emit(
                    EventKind::Interval,
                    key,
                    entry.start,
                    end,
                    OutPayload::Pair(entry.payload, None),
                );
            }
        }
    }
}

fn pair<P: Clone>(
    ctx: &LaneContext<'_, P>,
    key: u64,
    left: u64,
    right: u64,
) -> Option<OutPayload<P>> {
    let left = ctx.entry(key, left)?;
    let right = ctx.entry(key, right)?;
    Some(OutPayload::Pair(
        left.payload.clone(),
        Some(right.payload.clone()),
    ))
}

impl Logic for JoinLogic {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Join(self.kind)
    }

    fn on_event<P: Clone>(&self, ctx: &mut LaneContext<'_, P>, side: Side, event: InputEvent<P>) {
        let InputEvent {
            kind,
            key,
            sync_time,
            other_time,
            payload,
        } = event;

        if kind == EventKind::End {
            match ctx.find_open(side, key, other_time, &payload) {
                Some(id) => self.retire(ctx, key, id, sync_time),
                None => tracing::trace!("Ignoring unmatched end edge on {side:?} at {sync_time}"),
            }
            return;
        }

        let end = if kind == EventKind::Start {
            SyncTime::INFINITY
        } else {
            other_time
        };
        let held = self.kind == JoinKind::LeftOuter && side == Side::Left;
        let id = ctx.insert(side, key, sync_time, end, payload, held);

        for other in ctx.entries_of(key, side.other()) {
            let (left, right) = match side {
                Side::Left => (id, other),
                Side::Right => (other, id),
            };
            ctx.set_matched(key, left);
            ctx.set_matched(key, right);

            let (Some(left_entry), Some(right_entry)) = (ctx.entry(key, left), ctx.entry(key, right))
            else {
                continue;
            };
            let closed = !left_entry.is_open() && !right_entry.is_open();
            let end = left_entry.end.min(right_entry.end);
            let payload = OutPayload::Pair(
                left_entry.payload.clone(),
                Some(right_entry.payload.clone()),
            );

            if closed {
                ctx.emit(EventKind::Interval, key, sync_time, end, payload);
            } else {
                ctx.emit(
                    EventKind::Start,
                    key,
                    sync_time,
                    SyncTime::INFINITY,
                    payload,
                );
                ctx.open_match(left, right, sync_time);
            }
        }
    }

    fn on_retire<P: Clone>(&self, ctx: &mut LaneContext<'_, P>, key: u64, id: u64) {
        if let Some(end) = ctx.entry(key, id).map(|entry| entry.end) {
            self.retire(ctx, key, id, end);
        }
    }

    fn on_end_of_stream<P: Clone>(&self, ctx: &mut LaneContext<'_, P>) {
        if self.kind != JoinKind::LeftOuter {
            return;
        }
        for (key, id) in ctx.held_open() {
            if let Some(entry) = ctx.remove(key, id) {
                ctx.emit(
                    EventKind::Start,
                    key,
                    entry.start,
                    SyncTime::INFINITY,
                    OutPayload::Pair(entry.payload, None),
                );
            }
        }
    }
}
