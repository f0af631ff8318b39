//! Testing utilities for IPU workspace
//!
//! Shared fixture models, scripted actors, and a three-phase workflow.

#![allow(missing_docs)]

use ipu_engine::{
    Actor, ActorContext, ActorDescriptor, ActorRegistry, ActorStop, ConfigurationSnapshot,
    EnvironmentSink, Phase, RetryPolicy, Workflow,
};
use ipu_model::{Field, FieldKind, Message, MessageType, Model, ModelRegistry, Report};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const WORKFLOW_TAG: &str = "TestWorkflow";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsFacts {
    pub version: String,
    pub arch: String,
}

impl Model for OsFacts {
    const NAME: &'static str = "OSFacts";
    const TOPIC: &'static str = "SystemInfoTopic";

    fn fields() -> Vec<Field> {
        vec![
            Field::required("version", FieldKind::String),
            Field::required("arch", FieldKind::String),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub applied: bool,
}

impl Model for ApplyResult {
    const NAME: &'static str = "ApplyResult";
    const TOPIC: &'static str = "TransactionTopic";

    fn fields() -> Vec<Field> {
        vec![Field::required("applied", FieldKind::Boolean)]
    }
}

/// Generic fixture model; `name` distinguishes instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub name: String,
}

impl Model for Token {
    const NAME: &'static str = "Token";
    const TOPIC: &'static str = "TestTopic";

    fn fields() -> Vec<Field> {
        vec![Field::required("name", FieldKind::String)]
    }
}

/// Built-in models plus the fixture models
#[must_use]
pub fn fixture_models() -> ModelRegistry {
    let mut models = ModelRegistry::with_builtins();
    models.register::<OsFacts>().unwrap();
    models.register::<ApplyResult>().unwrap();
    models.register::<Token>().unwrap();
    models
}

/// Register `n` schemas named `T0..Tn` on topic `TestTopic`
pub fn register_numbered_types(models: &mut ModelRegistry, n: usize) {
    for i in 0..n {
        models
            .register_schema(ipu_model::ModelSchema::new(
                format!("T{i}"),
                "TestTopic",
                Vec::new(),
            ))
            .unwrap();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Ran(String),
    Read {
        actor: String,
        msg_type: String,
        count: usize,
    },
    Env {
        key: String,
        value: String,
    },
}

/// Shared, ordered record of what fixtures observed
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl RunLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: Entry) {
        self.entries.lock().push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().clone()
    }

    /// Actor names in run order
    #[must_use]
    pub fn ran(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                Entry::Ran(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Number of messages `actor` saw of `msg_type` on its last read
    #[must_use]
    pub fn read_count(&self, actor: &str, msg_type: &str) -> Option<usize> {
        self.entries().into_iter().rev().find_map(|e| match e {
            Entry::Read {
                actor: a,
                msg_type: t,
                count,
            } if a == actor && t == msg_type => Some(count),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Environment sink that records into a [`RunLog`]
#[derive(Debug, Clone)]
pub struct RecordingEnv {
    log: RunLog,
}

impl RecordingEnv {
    #[must_use]
    pub fn new(log: &RunLog) -> Self {
        Self { log: log.clone() }
    }
}

impl EnvironmentSink for RecordingEnv {
    fn set_var(&mut self, key: &str, value: &str) {
        self.log.push(Entry::Env {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
}

/// How a scripted actor ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ending {
    Complete,
    Skip(String),
    Fatal(String),
    Fail(String),
    Panic(String),
}

/// Actor that records its run, reads, emits, then ends as scripted
#[derive(Debug, Clone)]
pub struct ScriptedActor {
    log: RunLog,
    reads: Vec<MessageType>,
    emits: Vec<Message>,
    ending: Ending,
}

impl ScriptedActor {
    #[must_use]
    pub fn new(log: &RunLog) -> Self {
        Self {
            log: log.clone(),
            reads: Vec::new(),
            emits: Vec::new(),
            ending: Ending::Complete,
        }
    }

    #[must_use]
    pub fn reads(mut self, msg_type: impl Into<MessageType>) -> Self {
        self.reads.push(msg_type.into());
        self
    }

    #[must_use]
    pub fn emits<M: Model>(self, model: &M) -> Self {
        self.emits_message(Message::from_model(model).unwrap())
    }

    #[must_use]
    pub fn emits_message(mut self, message: Message) -> Self {
        self.emits.push(message);
        self
    }

    #[must_use]
    pub fn ending(mut self, ending: Ending) -> Self {
        self.ending = ending;
        self
    }
}

#[async_trait::async_trait]
impl Actor for ScriptedActor {
    async fn process(&self, ctx: &mut ActorContext<'_>) -> Result<(), ActorStop> {
        let name = ctx.actor_name().to_string();
        self.log.push(Entry::Ran(name.clone()));

        for msg_type in &self.reads {
            let count = ctx.consume_type(msg_type)?.count();
            self.log.push(Entry::Read {
                actor: name.clone(),
                msg_type: msg_type.to_string(),
                count,
            });
        }
        for message in &self.emits {
            ctx.produce_message(message.clone())?;
        }

        match &self.ending {
            Ending::Complete => Ok(()),
            Ending::Skip(reason) => Err(ActorStop::recoverable(reason.clone())),
            Ending::Fatal(reason) => Err(ActorStop::fatal(reason.clone())),
            Ending::Fail(reason) => Err(anyhow::anyhow!("{reason}").into()),
            Ending::Panic(reason) => panic!("{reason}"),
        }
    }
}

/// `Facts -> Checks -> Apply`, Checks gated on inhibitors, Apply asks for a
/// reboot
#[must_use]
pub fn three_phase_workflow() -> Workflow {
    Workflow::builder("TestWorkflow", WORKFLOW_TAG)
        .phase(Phase::new("Facts", "FactsPhase"))
        .phase(Phase::new("Checks", "ChecksPhase").stop_if_inhibited())
        .phase(
            Phase::new("Apply", "ApplyPhase")
                .request_restart()
                .with_retry_policy(RetryPolicy::Disabled),
        )
        .build()
        .unwrap()
}

/// Descriptor tagged for the fixture workflow and a phase
#[must_use]
pub fn descriptor(name: &str, phase_tag: &str) -> ipu_engine::ActorDescriptorBuilder {
    ActorDescriptor::builder(name)
        .tag(WORKFLOW_TAG)
        .tag(phase_tag)
}

/// One fact gatherer, one checker (optionally inhibiting), one applier
#[must_use]
pub fn standard_registry(log: &RunLog, inhibit: bool) -> ActorRegistry {
    let facts = OsFacts {
        version: "8.10".into(),
        arch: "x86_64".into(),
    };
    let verdict = if inhibit {
        Report::inhibitor("Unsupported", "target not supported")
    } else {
        Report::new("Supported", "upgrade path is supported")
    };

    let mut registry = ActorRegistry::new(fixture_models());
    registry
        .register_all([
            descriptor("gather_facts", "FactsPhase")
                .produces::<OsFacts>()
                .build(ScriptedActor::new(log).emits(&facts)),
            descriptor("check_path", "ChecksPhase")
                .consumes::<OsFacts>()
                .produces::<Report>()
                .build(
                    ScriptedActor::new(log)
                        .reads(OsFacts::NAME)
                        .emits(&verdict),
                ),
            descriptor("apply_upgrade", "ApplyPhase")
                .consumes::<OsFacts>()
                .produces::<ApplyResult>()
                .build(
                    ScriptedActor::new(log)
                        .reads(OsFacts::NAME)
                        .emits(&ApplyResult { applied: true }),
                ),
        ])
        .unwrap();
    registry
}

/// Configuration snapshot with the given captured environment
#[must_use]
pub fn configuration(env: &[(&str, &str)]) -> ConfigurationSnapshot {
    ConfigurationSnapshot::new("8.10", "9.6", "x86_64").with_env(
        env.iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
    )
}
