//! Collision event dispatcher.
//!
//! Correlates the solver's per-contact `begin` and per-point `process`
//! callbacks into one start event and at most one contact event per hook.
//! Sessions are keyed by the solver's contact token, so contacts of
//! different pairs may interleave freely within a step.

use std::collections::{BTreeMap, HashMap};

use solver::{ContactAccess, ContactToken};

use super::{CollisionHook, CollisionStart, Contact, ContactResponse, MaterialPairKey};
use crate::error::{PhysicsError, Result};
use crate::types::{BodyId, HookId, MaterialId};

struct Subscriber {
    id: HookId,
    hook: CollisionHook,
}

#[derive(Debug, Clone, Copy)]
struct SubscriberSession {
    hook: HookId,
    raised: bool,
    cancelled: bool,
    /// The subscriber has a contact handler.
    listens: bool,
}

struct ContactSession {
    key: MaterialPairKey,
    start: CollisionStart,
    flipped: bool,
    subscribers: Vec<SubscriberSession>,
}

impl ContactSession {
    fn allows_response(&self) -> bool {
        !self.subscribers.iter().any(|s| s.cancelled)
    }

    /// Some subscriber that did not veto still waits for its contact event.
    fn awaits_contact(&self) -> bool {
        self.subscribers
            .iter()
            .any(|s| s.listens && !s.cancelled && !s.raised)
    }
}

#[derive(Default)]
pub struct CollisionEventDispatcher {
    hooks: BTreeMap<MaterialPairKey, Vec<Subscriber>>,
    pair_of_hook: HashMap<HookId, MaterialPairKey>,
    sessions: HashMap<ContactToken, ContactSession>,
    next_hook: u32,
}

impl CollisionEventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber for the pair. Returns its id and whether it is the
    /// first subscriber of that pair.
    pub fn register(&mut self, a: MaterialId, b: MaterialId, hook: CollisionHook) -> (HookId, bool) {
        let key = MaterialPairKey::new(a, b);
        let id = HookId(self.next_hook);
        self.next_hook += 1;
        let subscribers = self.hooks.entry(key).or_default();
        subscribers.push(Subscriber { id, hook });
        self.pair_of_hook.insert(id, key);
        tracing::debug!(hook = id.0, pair = ?key, "registered collision hook");
        (id, subscribers.len() == 1)
    }

    /// Removes a subscriber. Returns its pair and whether the pair has no
    /// subscribers left.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::UnknownHook`] for ids not currently registered.
    pub fn remove(&mut self, id: HookId) -> Result<(MaterialPairKey, bool)> {
        let key = self
            .pair_of_hook
            .remove(&id)
            .ok_or(PhysicsError::UnknownHook(id))?;
        let mut now_empty = true;
        if let Some(subscribers) = self.hooks.get_mut(&key) {
            subscribers.retain(|s| s.id != id);
            now_empty = subscribers.is_empty();
        }
        if now_empty {
            self.hooks.remove(&key);
        }
        Ok((key, now_empty))
    }

    #[must_use]
    pub fn subscriber_count(&self, a: MaterialId, b: MaterialId) -> usize {
        self.hooks
            .get(&MaterialPairKey::new(a, b))
            .map_or(0, Vec::len)
    }

    /// Handles the solver's `begin` callback. Returns whether the solver
    /// should go on to `process` the contact: true when nobody vetoed, or when
    /// another subscriber still needs its contact event. A veto is then
    /// enforced by every `process` call.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::UnregisteredMaterialPair`] when no hook is
    /// registered for the pair; the solver should never report such a contact.
    pub fn begin(
        &mut self,
        token: ContactToken,
        bodies: (Option<BodyId>, Option<BodyId>),
        materials: (MaterialId, MaterialId),
    ) -> Result<bool> {
        let key = MaterialPairKey::new(materials.0, materials.1);
        let subscribers = match self.hooks.get_mut(&key) {
            Some(subscribers) if !subscribers.is_empty() => subscribers,
            _ => return Err(PhysicsError::UnregisteredMaterialPair(key.0, key.1)),
        };

        let flipped = materials.0 > materials.1;
        let start = if flipped {
            CollisionStart {
                body_a: bodies.1,
                body_b: bodies.0,
                material_a: materials.1,
                material_b: materials.0,
            }
        } else {
            CollisionStart {
                body_a: bodies.0,
                body_b: bodies.1,
                material_a: materials.0,
                material_b: materials.1,
            }
        };

        let states = subscribers
            .iter_mut()
            .map(|subscriber| {
                let response = subscriber
                    .hook
                    .on_start
                    .as_mut()
                    .map_or(ContactResponse::Allow, |handler| handler(&start));
                SubscriberSession {
                    hook: subscriber.id,
                    raised: false,
                    cancelled: response.is_veto(),
                    listens: subscriber.hook.on_contact.is_some(),
                }
            })
            .collect();

        let session = ContactSession {
            key,
            start,
            flipped,
            subscribers: states,
        };
        let allowed = session.allows_response() || session.awaits_contact();
        tracing::trace!(token = token.0, allowed, "contact begin");
        // A reused token overwrites the previous session.
        self.sessions.insert(token, session);
        Ok(allowed)
    }

    /// Handles one `process` callback. Each subscriber's contact handler runs
    /// at most once per session; later calls only replay the verdict.
    ///
    /// # Errors
    ///
    /// Returns [`PhysicsError::ProcessWithoutBegin`] when no `begin` was seen
    /// for `token`.
    pub fn process(&mut self, token: ContactToken, access: &dyn ContactAccess) -> Result<bool> {
        let session = self
            .sessions
            .get_mut(&token)
            .ok_or(PhysicsError::ProcessWithoutBegin(token))?;
        let contact = Contact::new(session.start, session.flipped, access);
        let mut subscribers = self.hooks.get_mut(&session.key);

        for state in &mut session.subscribers {
            if state.cancelled || state.raised {
                continue;
            }
            state.raised = true;
            let handler = subscribers
                .as_deref_mut()
                .and_then(|list| list.iter_mut().find(|s| s.id == state.hook))
                .and_then(|subscriber| subscriber.hook.on_contact.as_mut());
            if let Some(handler) = handler {
                if handler(&contact).is_veto() {
                    state.cancelled = true;
                }
            }
        }
        Ok(session.allows_response())
    }

    /// Drops all sessions. Called after every native step.
    pub fn end_step(&mut self) {
        self.sessions.clear();
    }

    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub(crate) fn clear(&mut self) {
        self.hooks.clear();
        self.pair_of_hook.clear();
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::Vec3;

    use super::*;

    struct FixedContact;

    impl ContactAccess for FixedContact {
        fn position(&self) -> Vec3 {
            Vec3::ZERO
        }

        fn normal(&self) -> Vec3 {
            Vec3::Y
        }

        fn normal_speed(&self) -> f32 {
            1.0
        }

        fn force(&self) -> Vec3 {
            Vec3::ZERO
        }

        fn tangent_directions(&self) -> (Vec3, Vec3) {
            (Vec3::X, Vec3::Z)
        }
    }

    const A: MaterialId = MaterialId(1);
    const B: MaterialId = MaterialId(2);

    fn recording_hook(log: &Rc<RefCell<Vec<&'static str>>>, start_veto: bool) -> CollisionHook {
        let on_start = Rc::clone(log);
        let on_contact = Rc::clone(log);
        CollisionHook::new()
            .on_start(move |_| {
                on_start.borrow_mut().push("start");
                if start_veto {
                    ContactResponse::Veto
                } else {
                    ContactResponse::Allow
                }
            })
            .on_contact(move |_| {
                on_contact.borrow_mut().push("contact");
                ContactResponse::Allow
            })
    }

    #[test]
    fn contact_event_fires_once_per_begin() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = CollisionEventDispatcher::new();
        dispatcher.register(A, B, recording_hook(&log, false));

        let token = ContactToken(7);
        assert!(dispatcher
            .begin(token, (Some(BodyId(0)), Some(BodyId(1))), (A, B))
            .unwrap());
        for _ in 0..4 {
            assert!(dispatcher.process(token, &FixedContact).unwrap());
        }

        assert_eq!(*log.borrow(), vec!["start", "contact"]);
    }

    #[test]
    fn start_veto_suppresses_contact_and_sticks() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = CollisionEventDispatcher::new();
        dispatcher.register(A, B, recording_hook(&log, true));

        let token = ContactToken(1);
        assert!(!dispatcher.begin(token, (None, Some(BodyId(3))), (A, B)).unwrap());
        for _ in 0..3 {
            assert!(!dispatcher.process(token, &FixedContact).unwrap());
        }
        assert_eq!(*log.borrow(), vec!["start"]);
    }

    #[test]
    fn contact_veto_persists_for_the_session() {
        let mut dispatcher = CollisionEventDispatcher::new();
        dispatcher.register(
            A,
            B,
            CollisionHook::new().on_contact(|_| ContactResponse::Veto),
        );
        let token = ContactToken(2);
        assert!(dispatcher.begin(token, (None, None), (A, B)).unwrap());
        assert!(!dispatcher.process(token, &FixedContact).unwrap());
        assert!(!dispatcher.process(token, &FixedContact).unwrap());
    }

    #[test]
    fn subscribers_keep_independent_sessions() {
        let first = Rc::new(RefCell::new(Vec::new()));
        let second = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = CollisionEventDispatcher::new();
        dispatcher.register(A, B, recording_hook(&first, true));
        dispatcher.register(B, A, recording_hook(&second, false));
        assert_eq!(dispatcher.subscriber_count(A, B), 2);

        let token = ContactToken(3);
        // The second subscriber still expects its contact event.
        assert!(dispatcher.begin(token, (None, None), (A, B)).unwrap());
        assert!(!dispatcher.process(token, &FixedContact).unwrap());
        assert!(!dispatcher.process(token, &FixedContact).unwrap());

        assert_eq!(*first.borrow(), vec!["start"]);
        assert_eq!(*second.borrow(), vec!["start", "contact"]);
    }

    #[test]
    fn veto_without_listeners_skips_the_contact() {
        let mut dispatcher = CollisionEventDispatcher::new();
        dispatcher.register(A, B, CollisionHook::new().on_start(|_| ContactResponse::Veto));
        dispatcher.register(A, B, CollisionHook::new());
        assert!(!dispatcher.begin(ContactToken(6), (None, None), (A, B)).unwrap());
    }

    #[test]
    fn bodies_are_ordered_by_material() {
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let mut dispatcher = CollisionEventDispatcher::new();
        dispatcher.register(
            A,
            B,
            CollisionHook::new().on_start(move |start| {
                *sink.borrow_mut() = Some(*start);
                ContactResponse::Allow
            }),
        );

        dispatcher
            .begin(ContactToken(4), (Some(BodyId(10)), Some(BodyId(20))), (B, A))
            .unwrap();

        let start = seen.borrow().unwrap();
        assert_eq!(start.material_a, A);
        assert_eq!(start.body_a, Some(BodyId(20)));
        assert_eq!(start.body_b, Some(BodyId(10)));
    }

    #[test]
    fn process_without_begin_is_an_error() {
        let mut dispatcher = CollisionEventDispatcher::new();
        dispatcher.register(A, B, CollisionHook::new());
        assert_eq!(
            dispatcher.process(ContactToken(9), &FixedContact),
            Err(PhysicsError::ProcessWithoutBegin(ContactToken(9)))
        );
    }

    #[test]
    fn begin_for_unregistered_pair_is_an_error() {
        let mut dispatcher = CollisionEventDispatcher::new();
        assert_eq!(
            dispatcher.begin(ContactToken(0), (None, None), (A, A)),
            Err(PhysicsError::UnregisteredMaterialPair(A, A))
        );
    }

    #[test]
    fn sessions_end_with_the_step() {
        let mut dispatcher = CollisionEventDispatcher::new();
        let (hook, first) = dispatcher.register(A, B, CollisionHook::new());
        assert!(first);
        dispatcher.begin(ContactToken(5), (None, None), (A, B)).unwrap();
        assert_eq!(dispatcher.open_sessions(), 1);
        dispatcher.end_step();
        assert_eq!(dispatcher.open_sessions(), 0);

        let (key, empty) = dispatcher.remove(hook).unwrap();
        assert_eq!(key, MaterialPairKey(A, B));
        assert!(empty);
        assert_eq!(dispatcher.remove(hook), Err(PhysicsError::UnknownHook(hook)));
    }
}
