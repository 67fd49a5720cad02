//! Hand-off from network and background threads to the tick thread. Only
//! the tick thread touches `World`; everyone else submits intents.

use crate::entities::item::{ItemId, ItemTypeId};
use crate::telemetry::logging;
use crate::world::cylinder::ReturnValue;
use crate::world::state::World;
use crate::world::thing::{HolderId, SlotIndex, ThingId};
use crate::world::transfer::MoveReport;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldIntent {
    MoveThing {
        from: HolderId,
        thing: ThingId,
        to: HolderId,
        index: SlotIndex,
        count: u16,
    },
    AddItem {
        holder: HolderId,
        index: SlotIndex,
        type_id: ItemTypeId,
        count: u16,
    },
    RemoveItem {
        item: ItemId,
        count: u16,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentOutcome {
    Moved(MoveReport),
    Added(MoveReport),
    Removed { item: ItemId, remaining: u16 },
    Rejected(ReturnValue),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct IntentQueue {
    sender: Sender<WorldIntent>,
}

impl IntentQueue {
    pub fn submit(&self, intent: WorldIntent) -> Result<(), String> {
        self.sender
            .send(intent)
            .map_err(|_| "tick runner has shut down".to_string())
    }
}

#[derive(Debug)]
pub struct TickRunner {
    receiver: Receiver<WorldIntent>,
    max_per_tick: usize,
}

/// Create a connected queue/runner pair. `max_per_tick` bounds how many
/// intents one tick applies; the rest wait for the next tick.
pub fn intent_channel(max_per_tick: usize) -> (IntentQueue, TickRunner) {
    let (sender, receiver) = mpsc::channel();
    (
        IntentQueue { sender },
        TickRunner {
            receiver,
            max_per_tick: max_per_tick.max(1),
        },
    )
}

impl TickRunner {
    /// Apply queued intents in arrival order.
    pub fn run_tick(&mut self, world: &mut World) -> Vec<(WorldIntent, IntentOutcome)> {
        let mut results = Vec::new();
        while results.len() < self.max_per_tick {
            let intent = match self.receiver.try_recv() {
                Ok(intent) => intent,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            let outcome = apply_intent(world, intent);
            if let IntentOutcome::Failed(err) = &outcome {
                logging::log_error(&format!("intent {:?} failed: {}", intent, err));
            }
            results.push((intent, outcome));
        }
        results
    }
}

pub fn apply_intent(world: &mut World, intent: WorldIntent) -> IntentOutcome {
    match intent {
        WorldIntent::MoveThing {
            from,
            thing,
            to,
            index,
            count,
        } => match world.move_thing(from, thing, to, index, count) {
            Ok(report) => IntentOutcome::Moved(report),
            Err(err) => IntentOutcome::Rejected(err),
        },
        WorldIntent::AddItem {
            holder,
            index,
            type_id,
            count,
        } => {
            let item = match world.create_item(type_id, count) {
                Ok(item) => item,
                Err(err) => return IntentOutcome::Failed(err),
            };
            match world.add_item(holder, index, item) {
                Ok(report) => {
                    if report.remainder > 0 {
                        let _ = world.destroy_item(item);
                    }
                    IntentOutcome::Added(report)
                }
                Err(err) => {
                    let _ = world.destroy_item(item);
                    IntentOutcome::Rejected(err)
                }
            }
        }
        WorldIntent::RemoveItem { item, count } => match world.remove_item(item, count) {
            Ok(remaining) => IntentOutcome::Removed { item, remaining },
            Err(err) => IntentOutcome::Rejected(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::item_types::{ItemType, ItemTypeIndex};
    use crate::world::position::Position;

    const SQUARE: Position = Position { x: 1, y: 1, z: 7 };

    fn world() -> World {
        let mut types = ItemTypeIndex::default();
        let mut coin = ItemType::new(ItemTypeId(3031), "gold coin");
        coin.stackable = true;
        types.insert(coin).expect("coin");
        let mut world = World::new(types);
        world.add_tile(SQUARE);
        world
    }

    #[test]
    fn intents_from_other_threads_apply_in_order() {
        let mut world = world();
        let (queue, mut runner) = intent_channel(16);
        let producer = queue.clone();
        std::thread::spawn(move || {
            producer
                .submit(WorldIntent::AddItem {
                    holder: HolderId::Tile(SQUARE),
                    index: SlotIndex::Anywhere,
                    type_id: ItemTypeId(3031),
                    count: 40,
                })
                .expect("submit");
        })
        .join()
        .expect("producer");
        queue
            .submit(WorldIntent::AddItem {
                holder: HolderId::Tile(SQUARE),
                index: SlotIndex::Anywhere,
                type_id: ItemTypeId(3031),
                count: 25,
            })
            .expect("submit");

        let results = runner.run_tick(&mut world);
        assert_eq!(results.len(), 2);
        let Some((_, IntentOutcome::Added(first))) = results.first() else {
            panic!("first add failed: {:?}", results);
        };
        let Some((_, IntentOutcome::Added(second))) = results.get(1) else {
            panic!("second add failed: {:?}", results);
        };
        assert_eq!(second.thing, first.thing);
        assert_eq!(world.things().count(first.thing), 65);
    }

    #[test]
    fn tick_applies_at_most_budget() {
        let mut world = world();
        let (queue, mut runner) = intent_channel(1);
        for _ in 0..3 {
            queue
                .submit(WorldIntent::RemoveItem {
                    item: ItemId(999_999),
                    count: 1,
                })
                .expect("submit");
        }
        let results = runner.run_tick(&mut world);
        assert_eq!(
            results,
            vec![(
                WorldIntent::RemoveItem {
                    item: ItemId(999_999),
                    count: 1
                },
                IntentOutcome::Rejected(ReturnValue::NotPossible)
            )]
        );
        assert_eq!(runner.run_tick(&mut world).len(), 1);
    }
}
