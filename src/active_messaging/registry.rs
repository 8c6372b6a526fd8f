use crate::active_messaging::handler::{HandlerId, HandlerIdent, NodeType};
use crate::active_messaging::{ActiveClosureFn, ExecFn, Tag, NO_TAG};

use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Arc;

/// First identifier handed out by each registration counter
pub const HANDLER_ID_BASE: u64 = 1;
pub(crate) const AUTO_ID_START: HandlerIdent = 1;

pub(crate) type TriggerFn = Arc<dyn Fn(HandlerId) + Send + Sync>;

/// Link-time registration of a handler generated by `#[active_fn]` or `#[am_functor]`
#[doc(hidden)]
pub struct RegisteredHandler {
    pub exec: ExecFn,
    pub name: &'static str,
    pub functor: bool,
}
crate::inventory::collect!(RegisteredHandler);

lazy_static! {
    // every rank links the same set of handlers, so sorting by name yields the same ids everywhere
    pub(crate) static ref AUTO_HANDLER_IDS: HashMap<&'static str, HandlerId> = {
        let handlers = crate::inventory::iter::<RegisteredHandler>
            .into_iter()
            .map(|h| (h.name, h.functor))
            .sorted()
            .collect::<Vec<_>>();
        let duplicates = handlers
            .iter()
            .map(|(name, _)| name)
            .duplicates()
            .collect::<Vec<_>>();
        if duplicates.len() > 0 {
            panic!(
                "duplicate registered active handlers {:?}, handlers must have unique names",
                duplicates
            );
        }
        let mut cnt = AUTO_ID_START;
        let mut temp = HashMap::new();
        for (name, functor) in handlers {
            temp.insert(name, HandlerId::auto(cnt, functor));
            cnt += 1;
        }
        temp
    };
}

lazy_static! {
    pub(crate) static ref AUTO_HANDLERS: HashMap<HandlerId, ActiveClosureFn> = {
        let mut temp = HashMap::new();
        for handler in crate::inventory::iter::<RegisteredHandler> {
            let exec = handler.exec;
            if let Some(id) = AUTO_HANDLER_IDS.get(&handler.name) {
                temp.insert(*id, Arc::new(exec) as ActiveClosureFn);
            }
        }
        temp
    };
}

/// Resolve the handler id for an auto handler name
pub(crate) fn auto_handler_id(name: &str) -> HandlerId {
    match AUTO_HANDLER_IDS.get(name) {
        Some(id) => *id,
        None => panic!(
            "active handler {name} is not registered, make sure it is annotated with #[active_fn] or #[am_functor]"
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    HandlerNotFound(HandlerId, Tag),
    SwapUnregistered(HandlerId, Tag),
    InvalidTag(Tag),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RegistryError::HandlerNotFound(han, tag) => {
                if *tag == NO_TAG {
                    write!(f, "handler {:?} is not registered", han)
                } else {
                    write!(f, "handler {:?} is not registered with tag {}", han, tag)
                }
            }
            RegistryError::SwapUnregistered(han, tag) => {
                write!(
                    f,
                    "cannot swap handler {:?} (tag {}), it was never registered",
                    han, tag
                )
            }
            RegistryError::InvalidTag(tag) => {
                write!(
                    f,
                    "invalid tag {}, tags must be non-negative (or NO_TAG)",
                    tag
                )
            }
        }
    }
}

impl std::error::Error for RegistryError {}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Table mapping handler ids (and optionally tags) to the closures that run when a message arrives.
///
/// Untagged and tagged registrations live in separate tables, so a lookup with a tag never
/// returns a closure stored under a different tag (or under no tag).
/// Identifiers are never reused, unregistering a handler does not roll back its counter.
pub struct Registry {
    node: NodeType,
    handlers: HashMap<HandlerId, ActiveClosureFn>,
    tagged: HashMap<(HandlerId, Tag), ActiveClosureFn>,
    triggers: HashMap<HandlerId, TriggerFn>,
    next_ident: HandlerIdent,
    next_collective_ident: HandlerIdent,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("node", &self.node)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("tagged", &self.tagged.keys().collect::<Vec<_>>())
            .field("next_ident", &self.next_ident)
            .field("next_collective_ident", &self.next_collective_ident)
            .finish()
    }
}

fn check_tag(tag: Tag) -> RegistryResult<()> {
    if tag < 0 && tag != NO_TAG {
        Err(RegistryError::InvalidTag(tag))
    } else {
        Ok(())
    }
}

impl Registry {
    pub fn new(node: NodeType) -> Registry {
        Registry {
            node,
            handlers: HashMap::new(),
            tagged: HashMap::new(),
            triggers: HashMap::new(),
            next_ident: HANDLER_ID_BASE,
            next_collective_ident: HANDLER_ID_BASE,
        }
    }

    pub fn node(&self) -> NodeType {
        self.node
    }

    fn insert(&mut self, han: HandlerId, func: ActiveClosureFn, tag: Tag) {
        if tag == NO_TAG {
            self.handlers.insert(han, func);
        } else {
            self.tagged.insert((han, tag), func);
        }
    }

    /// Register `func` under a freshly allocated id.
    ///
    /// Collective ids come from their own counter and carry no owning node, so ranks that
    /// register collectively in the same order agree on the ids.
    pub fn register_new_handler(
        &mut self,
        func: ActiveClosureFn,
        tag: Tag,
        is_collective: bool,
    ) -> HandlerId {
        if let Err(e) = check_tag(tag) {
            panic!("{e}");
        }
        let han = if is_collective {
            let ident = self.next_collective_ident;
            self.next_collective_ident += 1;
            HandlerId::collective(ident)
        } else {
            let ident = self.next_ident;
            self.next_ident += 1;
            HandlerId::registered(ident, self.node)
        };
        self.insert(han, func, tag);
        tracing::trace!("registered {:?} tag {}", han, tag);
        han
    }

    pub fn register_active_handler(&mut self, func: ActiveClosureFn, tag: Tag) -> HandlerId {
        self.register_new_handler(func, tag, true)
    }

    /// Remove the closure stored under `(han, tag)`, returns false if nothing was registered there.
    /// The trigger of `han` is dropped with its last registration.
    pub fn unregister_handler_fn(&mut self, han: HandlerId, tag: Tag) -> bool {
        let removed = if tag == NO_TAG {
            self.handlers.remove(&han).is_some()
        } else {
            self.tagged.remove(&(han, tag)).is_some()
        };
        if !self.is_registered(han) {
            self.triggers.remove(&han);
        }
        tracing::trace!("unregistered {:?} tag {} (found: {})", han, tag, removed);
        removed
    }

    fn is_registered(&self, han: HandlerId) -> bool {
        self.handlers.contains_key(&han) || self.tagged.keys().any(|(h, _)| *h == han)
    }

    fn was_issued(&self, han: HandlerId) -> bool {
        if han.is_auto() || han.is_uninitialized() {
            false
        } else if han.is_collective() {
            han.ident() >= HANDLER_ID_BASE && han.ident() < self.next_collective_ident
        } else {
            han.node() == self.node
                && han.ident() >= HANDLER_ID_BASE
                && han.ident() < self.next_ident
        }
    }

    /// Replace (or install) the closure for an id this registry has already handed out
    pub fn try_swap_handler(
        &mut self,
        han: HandlerId,
        func: ActiveClosureFn,
        tag: Tag,
    ) -> RegistryResult<()> {
        check_tag(tag)?;
        if !self.was_issued(han) {
            return Err(RegistryError::SwapUnregistered(han, tag));
        }
        self.insert(han, func, tag);
        Ok(())
    }

    pub fn swap_handler(&mut self, han: HandlerId, func: ActiveClosureFn, tag: Tag) {
        if let Err(e) = self.try_swap_handler(han, func, tag) {
            panic!("{e}");
        }
    }

    pub fn try_get_handler(&self, han: HandlerId, tag: Tag) -> RegistryResult<ActiveClosureFn> {
        let found = if han.is_auto() {
            AUTO_HANDLERS.get(&han)
        } else if tag == NO_TAG {
            self.handlers.get(&han)
        } else {
            self.tagged.get(&(han, tag))
        };
        found
            .cloned()
            .ok_or(RegistryError::HandlerNotFound(han, tag))
    }

    /// Look up the closure for `(han, tag)`, a miss is fatal
    pub fn get_handler(&self, han: HandlerId, tag: Tag) -> ActiveClosureFn {
        match self.try_get_handler(han, tag) {
            Ok(func) => func,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn get_handler_no_tag(&self, han: HandlerId) -> ActiveClosureFn {
        let found = if han.is_auto() {
            AUTO_HANDLERS.get(&han)
        } else {
            self.handlers.get(&han)
        };
        match found {
            Some(func) => func.clone(),
            None => panic!("{}", RegistryError::HandlerNotFound(han, NO_TAG)),
        }
    }

    /// `trigger` runs after every invocation of `han`
    pub fn save_trigger(&mut self, han: HandlerId, trigger: TriggerFn) {
        self.triggers.insert(han, trigger);
    }

    pub(crate) fn get_trigger(&self, han: HandlerId) -> Option<TriggerFn> {
        self.triggers.get(&han).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ActiveMessenger, ActiveMsg};

    fn noop() -> ActiveClosureFn {
        Arc::new(|_: &ActiveMessenger, _: ActiveMsg| {})
    }

    #[test]
    fn ids_increase_per_counter() {
        let mut reg = Registry::new(2);
        let a = reg.register_new_handler(noop(), NO_TAG, false);
        let b = reg.register_new_handler(noop(), NO_TAG, false);
        let c = reg.register_active_handler(noop(), NO_TAG);
        assert_eq!(a.ident(), HANDLER_ID_BASE);
        assert_eq!(b.ident(), HANDLER_ID_BASE + 1);
        assert_eq!(a.node(), 2);
        assert_eq!(c.ident(), HANDLER_ID_BASE);
        assert!(c.is_collective());
        assert_ne!(a, c);
    }

    #[test]
    fn swap_requires_issued_id() {
        let mut reg = Registry::new(0);
        let foreign = HandlerId::registered(HANDLER_ID_BASE, 1);
        assert_eq!(
            reg.try_swap_handler(foreign, noop(), NO_TAG),
            Err(RegistryError::SwapUnregistered(foreign, NO_TAG))
        );
        let han = reg.register_new_handler(noop(), NO_TAG, false);
        let replacement = noop();
        reg.swap_handler(han, replacement.clone(), NO_TAG);
        assert!(Arc::ptr_eq(&reg.get_handler(han, NO_TAG), &replacement));
    }

    #[test]
    #[should_panic(expected = "invalid tag")]
    fn negative_tags_are_rejected() {
        let mut reg = Registry::new(0);
        reg.register_new_handler(noop(), -5, false);
    }

    #[test]
    fn triggers_are_dropped_with_handler() {
        let mut reg = Registry::new(0);
        let han = reg.register_new_handler(noop(), NO_TAG, false);
        reg.save_trigger(han, Arc::new(|_: HandlerId| {}));
        assert!(reg.get_trigger(han).is_some());
        reg.unregister_handler_fn(han, NO_TAG);
        assert!(reg.get_trigger(han).is_none());
        assert!(!reg.unregister_handler_fn(han, NO_TAG));
    }
}
