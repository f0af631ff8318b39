//! Actors
//!
//! An actor is a self-contained unit of upgrade logic. Its [`ActorDescriptor`]
//! is the static contract the engine schedules by:
//! - `consumes`: message types it may read from the bus
//! - `produces`: message types it may append to the bus
//! - `tags`: workflow and phase tags that make it eligible for a phase
//! - `experimental`: excluded unless explicitly whitelisted
//!
//! Behaviour lives behind the [`Actor`] trait and is invoked with an
//! [`ActorContext`](crate::ActorContext) scoped to the descriptor.

mod registry;

pub use registry::ActorRegistry;

use crate::bus::ActorContext;
use crate::error::ContractViolation;
use ipu_model::{MessageType, Model, Tag};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Actor behaviour
#[async_trait::async_trait]
pub trait Actor: Send + Sync {
    /// Run the actor once
    ///
    /// # Errors
    /// Returns an [`ActorStop`] to end the actor early. How the stop affects
    /// the phase is decided by the phase policies.
    async fn process(&self, ctx: &mut ActorContext<'_>) -> Result<(), ActorStop>;
}

/// Early termination of an actor
#[derive(Debug, thiserror::Error)]
pub enum ActorStop {
    /// The actor chose to skip its work; the phase continues
    #[error("skipped: {reason}")]
    Recoverable {
        /// Reason shown to the operator
        reason: String,
    },

    /// The actor detected a condition that must end the run
    #[error("fatal: {reason}")]
    Fatal {
        /// Short reason
        reason: String,
        /// Optional diagnostic detail
        details: Option<String>,
    },

    /// The actor broke its message contract
    #[error(transparent)]
    Contract(#[from] ContractViolation),

    /// Any other failure
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ActorStop {
    /// Recoverable stop
    #[must_use]
    pub fn recoverable(reason: impl Into<String>) -> Self {
        ActorStop::Recoverable {
            reason: reason.into(),
        }
    }

    /// Fatal stop without details
    #[must_use]
    pub fn fatal(reason: impl Into<String>) -> Self {
        ActorStop::Fatal {
            reason: reason.into(),
            details: None,
        }
    }

    /// Attach diagnostic detail to a fatal stop; other stops are unchanged
    #[must_use]
    pub fn with_details(self, detail: impl Into<String>) -> Self {
        match self {
            ActorStop::Fatal { reason, .. } => ActorStop::Fatal {
                reason,
                details: Some(detail.into()),
            },
            other => other,
        }
    }
}

/// Static contract of one actor
#[derive(Clone)]
pub struct ActorDescriptor {
    name: String,
    description: String,
    consumes: BTreeSet<MessageType>,
    produces: BTreeSet<MessageType>,
    tags: BTreeSet<Tag>,
    experimental: bool,
    behaviour: Arc<dyn Actor>,
}

impl ActorDescriptor {
    /// Start describing an actor
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ActorDescriptorBuilder {
        ActorDescriptorBuilder {
            name: name.into(),
            description: String::new(),
            consumes: BTreeSet::new(),
            produces: BTreeSet::new(),
            tags: BTreeSet::new(),
            experimental: false,
        }
    }

    /// Unique actor name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description
    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Types the actor may read
    #[inline]
    #[must_use]
    pub fn consumes(&self) -> &BTreeSet<MessageType> {
        &self.consumes
    }

    /// Types the actor may write
    #[inline]
    #[must_use]
    pub fn produces(&self) -> &BTreeSet<MessageType> {
        &self.produces
    }

    /// Capability tags
    #[inline]
    #[must_use]
    pub fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    /// Whether the actor needs whitelisting to run
    #[inline]
    #[must_use]
    pub fn is_experimental(&self) -> bool {
        self.experimental
    }

    /// Whether the actor may consume the type
    #[inline]
    #[must_use]
    pub fn may_consume(&self, msg_type: &MessageType) -> bool {
        self.consumes.contains(msg_type)
    }

    /// Whether the actor may produce the type
    #[inline]
    #[must_use]
    pub fn may_produce(&self, msg_type: &MessageType) -> bool {
        self.produces.contains(msg_type)
    }

    /// Whether the actor carries the tag
    #[inline]
    #[must_use]
    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    /// Whether some type produced here is consumed by `other`
    #[must_use]
    pub fn feeds(&self, other: &ActorDescriptor) -> bool {
        self.produces.iter().any(|t| other.consumes.contains(t))
    }

    /// Behaviour to invoke
    #[inline]
    #[must_use]
    pub fn behaviour(&self) -> &Arc<dyn Actor> {
        &self.behaviour
    }
}

impl fmt::Debug for ActorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorDescriptor")
            .field("name", &self.name)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .field("tags", &self.tags)
            .field("experimental", &self.experimental)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ActorDescriptor`]
#[derive(Debug, Clone)]
pub struct ActorDescriptorBuilder {
    name: String,
    description: String,
    consumes: BTreeSet<MessageType>,
    produces: BTreeSet<MessageType>,
    tags: BTreeSet<Tag>,
    experimental: bool,
}

impl ActorDescriptorBuilder {
    /// With description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare a consumed model
    #[must_use]
    pub fn consumes<M: Model>(self) -> Self {
        self.consumes_type(M::message_type())
    }

    /// Declare a consumed type by name
    #[must_use]
    pub fn consumes_type(mut self, msg_type: impl Into<MessageType>) -> Self {
        self.consumes.insert(msg_type.into());
        self
    }

    /// Declare a produced model
    #[must_use]
    pub fn produces<M: Model>(self) -> Self {
        self.produces_type(M::message_type())
    }

    /// Declare a produced type by name
    #[must_use]
    pub fn produces_type(mut self, msg_type: impl Into<MessageType>) -> Self {
        self.produces.insert(msg_type.into());
        self
    }

    /// Add a tag
    #[must_use]
    pub fn tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Mark experimental
    #[must_use]
    pub fn experimental(mut self) -> Self {
        self.experimental = true;
        self
    }

    /// Attach behaviour and finish
    #[must_use]
    pub fn build(self, behaviour: impl Actor + 'static) -> ActorDescriptor {
        self.build_shared(Arc::new(behaviour))
    }

    /// Attach shared behaviour and finish
    #[must_use]
    pub fn build_shared(self, behaviour: Arc<dyn Actor>) -> ActorDescriptor {
        ActorDescriptor {
            name: self.name,
            description: self.description,
            consumes: self.consumes,
            produces: self.produces,
            tags: self.tags,
            experimental: self.experimental,
            behaviour,
        }
    }
}
