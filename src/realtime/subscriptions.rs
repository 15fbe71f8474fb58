//! Subscriber registry
//!
//! One handler slot per event tag. Registering a handler for a tag that
//! already has one replaces it; the token of the replaced handler becomes
//! stale and unsubscribing with it is a no-op.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::{
    AgentRecord, DeletedRecord, EventTag, RuleRecord, ServerEvent, ViolationRecord,
};

/// Type-erased subscriber callback
pub type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Capability returned by a subscription, used to remove it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    tag: EventTag,
    id: u64,
}

impl SubscriptionToken {
    pub fn tag(&self) -> EventTag {
        self.tag
    }
}

struct Slot {
    id: u64,
    handler: Handler,
}

/// Handler slots indexed by tag
#[derive(Default)]
pub struct Subscriptions {
    slots: HashMap<EventTag, Slot>,
    next_id: u64,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `tag`, replacing any previous one.
    ///
    /// Returns `None` for tags that never reach subscribers.
    pub fn insert(&mut self, tag: EventTag, handler: Handler) -> Option<SubscriptionToken> {
        if !tag.is_subscribable() {
            return None;
        }

        self.next_id += 1;
        let id = self.next_id;
        self.slots.insert(tag, Slot { id, handler });
        Some(SubscriptionToken { tag, id })
    }

    /// Remove the handler the token was issued for, if it is still installed
    pub fn remove(&mut self, token: SubscriptionToken) -> bool {
        match self.slots.get(&token.tag) {
            Some(slot) if slot.id == token.id => {
                self.slots.remove(&token.tag);
                true
            }
            _ => false,
        }
    }

    /// Handler currently installed for `tag`
    pub fn handler(&self, tag: EventTag) -> Option<Handler> {
        self.slots.get(&tag).map(|slot| Arc::clone(&slot.handler))
    }

}

/// Run a handler inside its own panic boundary
pub fn invoke(handler: &Handler, event: &ServerEvent) -> Result<()> {
    catch_unwind(AssertUnwindSafe(|| handler(event))).map_err(|panic| Error::SubscriberPanicked {
        tag: event.tag(),
        message: panic_message(panic.as_ref()),
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────
// Construction-time Handlers
// ─────────────────────────────────────────────────────────────────

/// Initial subscribers, one optional callback per event tag.
///
/// ```ignore
/// let handlers = Handlers::new()
///     .on_violation_created(|v| println!("new violation: {:?}", v.map(|v| &v.id)))
///     .on_agent_deleted(|d| println!("agent gone: {:?}", d));
/// ```
#[derive(Default, Clone)]
pub struct Handlers {
    entries: Vec<(EventTag, Handler)>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an untyped handler for `tag`. A later call for the same tag wins.
    pub fn on<F>(mut self, tag: EventTag, f: F) -> Self
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(f);
        self.entries.retain(|(t, _)| *t != tag);
        self.entries.push((tag, handler));
        self
    }

    pub fn on_violation_created<F>(self, f: F) -> Self
    where
        F: Fn(Option<&ViolationRecord>) + Send + Sync + 'static,
    {
        self.on(EventTag::ViolationCreated, move |event| {
            if let ServerEvent::ViolationCreated(data) = event {
                f(data.as_ref())
            }
        })
    }

    pub fn on_violation_resolved<F>(self, f: F) -> Self
    where
        F: Fn(Option<&ViolationRecord>) + Send + Sync + 'static,
    {
        self.on(EventTag::ViolationResolved, move |event| {
            if let ServerEvent::ViolationResolved(data) = event {
                f(data.as_ref())
            }
        })
    }

    pub fn on_violation_deleted<F>(self, f: F) -> Self
    where
        F: Fn(Option<&DeletedRecord>) + Send + Sync + 'static,
    {
        self.on(EventTag::ViolationDeleted, move |event| {
            if let ServerEvent::ViolationDeleted(data) = event {
                f(data.as_ref())
            }
        })
    }

    pub fn on_agent_updated<F>(self, f: F) -> Self
    where
        F: Fn(Option<&AgentRecord>) + Send + Sync + 'static,
    {
        self.on(EventTag::AgentUpdated, move |event| {
            if let ServerEvent::AgentUpdated(data) = event {
                f(data.as_ref())
            }
        })
    }

    pub fn on_agent_deleted<F>(self, f: F) -> Self
    where
        F: Fn(Option<&DeletedRecord>) + Send + Sync + 'static,
    {
        self.on(EventTag::AgentDeleted, move |event| {
            if let ServerEvent::AgentDeleted(data) = event {
                f(data.as_ref())
            }
        })
    }

    pub fn on_agent_status_changed<F>(self, f: F) -> Self
    where
        F: Fn(Option<&AgentRecord>) + Send + Sync + 'static,
    {
        self.on(EventTag::AgentStatusChanged, move |event| {
            if let ServerEvent::AgentStatusChanged(data) = event {
                f(data.as_ref())
            }
        })
    }

    pub fn on_rule_updated<F>(self, f: F) -> Self
    where
        F: Fn(Option<&RuleRecord>) + Send + Sync + 'static,
    {
        self.on(EventTag::RuleUpdated, move |event| {
            if let ServerEvent::RuleUpdated(data) = event {
                f(data.as_ref())
            }
        })
    }

    pub fn on_rule_toggled<F>(self, f: F) -> Self
    where
        F: Fn(Option<&RuleRecord>) + Send + Sync + 'static,
    {
        self.on(EventTag::RuleToggled, move |event| {
            if let ServerEvent::RuleToggled(data) = event {
                f(data.as_ref())
            }
        })
    }

    pub fn on_rule_deleted<F>(self, f: F) -> Self
    where
        F: Fn(Option<&DeletedRecord>) + Send + Sync + 'static,
    {
        self.on(EventTag::RuleDeleted, move |event| {
            if let ServerEvent::RuleDeleted(data) = event {
                f(data.as_ref())
            }
        })
    }

    /// Tags with a configured callback
    pub fn tags(&self) -> Vec<EventTag> {
        self.entries.iter().map(|(tag, _)| *tag).collect()
    }

    pub(crate) fn into_subscriptions(self) -> Subscriptions {
        let mut subscriptions = Subscriptions::new();
        for (tag, handler) in self.entries {
            if subscriptions.insert(tag, handler).is_none() {
                tracing::warn!(tag = %tag, "Ignoring handler for non-subscribable event");
            }
        }
        subscriptions
    }
}
