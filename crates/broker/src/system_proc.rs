//! System-proc bindings
//!
//! A system proc routes entries of a source topic through a named processor
//! into target topics. Only the binding is kept here; running processors is
//! the host's job.

use crate::broker::Broker;
use crate::error::{BrokerError, Result};
use crate::keys;
use crate::txn::{Staged, Transaction};
use proven_kvstore::ScanRange;
use serde::Serialize;

/// One persisted binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemProc {
    pub name: String,
    pub topic: String,
    pub to: Vec<String>,
    pub processor: String,
    pub created_at: u64,
}

/// Request to bind a processor to one or more source topics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemProcSpec {
    pub name: String,
    pub topics: Vec<String>,
    pub to: Vec<String>,
    pub processor: String,
}

impl SystemProc {
    pub fn blank(topic: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            topic: topic.to_string(),
            to: Vec::new(),
            processor: String::new(),
            created_at: 0,
        }
    }

    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("topic", self.topic.clone()),
            ("to", serde_json::json!(self.to).to_string()),
            ("processor", self.processor.clone()),
            ("createdAt", self.created_at.to_string()),
        ]
    }

    pub fn apply_field(&mut self, field: &str, value: &str) -> Result<bool> {
        let corrupt = || BrokerError::CorruptState(format!("system proc field {field}={value}"));
        match field {
            "name" => self.name = value.to_string(),
            "topic" => self.topic = value.to_string(),
            "to" => self.to = serde_json::from_str(value).map_err(|_| corrupt())?,
            "processor" => self.processor = value.to_string(),
            "createdAt" => self.created_at = value.parse().map_err(|_| corrupt())?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn write(&self, txn: &mut Transaction) {
        for (field, value) in self.fields() {
            txn.put(
                keys::system_proc_field_key(&self.topic, &self.name, field),
                value,
            );
        }
    }
}

impl Broker {
    /// Persist one binding per source topic in a single batch
    ///
    /// With several source topics each binding is named `<name>__<topic>`.
    pub fn create_system_proc(&mut self, spec: SystemProcSpec) -> Result<Vec<SystemProc>> {
        if !keys::is_valid_name(&spec.name) || spec.topics.is_empty() {
            return Err(BrokerError::InvalidSystemProc);
        }
        if spec
            .topics
            .iter()
            .chain(spec.to.iter())
            .any(|topic| !keys::is_valid_name(topic))
        {
            return Err(BrokerError::InvalidTopicFormat);
        }

        let now = self.now();
        let fan_out = spec.topics.len() > 1;
        let mut bindings: Vec<SystemProc> = Vec::with_capacity(spec.topics.len());
        for topic in &spec.topics {
            let name = if fan_out {
                format!("{}__{}", spec.name, topic)
            } else {
                spec.name.clone()
            };
            if self.state.system_procs.contains_key(&name)
                || bindings.iter().any(|b| b.name == name)
            {
                return Err(BrokerError::SystemProcExists);
            }
            bindings.push(SystemProc {
                name,
                topic: topic.clone(),
                to: spec.to.clone(),
                processor: spec.processor.clone(),
                created_at: now,
            });
        }

        let mut txn = Transaction::new();
        for binding in &bindings {
            binding.write(&mut txn);
        }
        let staged = Staged::new(txn, move |state| {
            for binding in &bindings {
                state
                    .system_procs
                    .insert(binding.name.clone(), binding.clone());
            }
            bindings
        });
        let created = self.apply(staged)?.unwrap_or_default();
        tracing::info!("Created {} system proc bindings for {}", created.len(), spec.name);
        Ok(created)
    }

    pub fn destroy_system_proc(&mut self, name: &str) -> Result<SystemProc> {
        let binding = self
            .state
            .system_procs
            .get(name)
            .cloned()
            .ok_or(BrokerError::InvalidSystemProc)?;

        let mut txn = Transaction::new();
        let scan = ScanRange::prefix(&keys::system_proc_prefix(&binding.topic, &binding.name));
        for item in self.store.scan(scan)? {
            let (key, _) = item?;
            txn.delete(key);
        }

        let name = binding.name.clone();
        let staged = Staged::new(txn, move |state| {
            state.system_procs.remove(&name);
        });
        if self.apply(staged)?.is_none() {
            self.state.system_procs.remove(&binding.name);
        }
        tracing::info!("Destroyed system proc {}", binding.name);
        Ok(binding)
    }

    pub fn system_procs(&self) -> Vec<SystemProc> {
        self.state.system_procs.values().cloned().collect()
    }
}
