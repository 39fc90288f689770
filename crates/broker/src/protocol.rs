//! JSON message contracts for hosts that drive the broker over a transport
//!
//! This layer owns the external id convention: ids, ranges and sequence
//! tokens seen by clients count tones from zero, while the core counts from
//! one. Every inbound token is shifted up here and every outbound id shifted
//! down, so nothing below this module sees a zero-based tone.
//!
//! Entry bodies are arbitrary JSON values on the wire and stored as their
//! JSON text.

use crate::broker::Broker;
use crate::claim::Claimed;
use crate::error::{BrokerError, Result};
use crate::id::{ClaimRange, LogId, TIMESTAMP_WIDTH};
use crate::log::{Commit, Committed, NewEntry};
use crate::proc::{Offset, OnMaxReclaims, Proc, ProcOptions, ProcStatus};
use crate::range::{LogEntry, RangeQuery};
use crate::service::BrokerHandle;
use crate::tone::Tone;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An entry as sent by a client
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EntryRequest {
    pub topic: String,
    pub body: Value,
}

/// One entry or a list of entries
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CommitLog {
    One(EntryRequest),
    Many(Vec<EntryRequest>),
}

/// Claim parameters; absent settings fall back to the broker's defaults
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub name: String,
    pub topic: String,
    #[serde(default)]
    pub offset: Option<String>,
    #[serde(default)]
    pub count: Option<usize>,
    /// `-1` means unlimited
    #[serde(default)]
    pub max_reclaims: Option<i64>,
    /// Milliseconds, `-1` means never
    #[serde(default)]
    pub reclaim_timeout: Option<i64>,
    #[serde(default)]
    pub on_max_reclaims_reached: Option<OnMaxReclaims>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    Commit {
        log: CommitLog,
    },
    #[serde(rename_all = "camelCase")]
    Range {
        topic: String,
        #[serde(default)]
        start: String,
        #[serde(default)]
        end: String,
        #[serde(default)]
        limit: i64,
        #[serde(default)]
        exclusive: bool,
        #[serde(default)]
        reverse: bool,
    },
    Claim(ClaimRequest),
    GetAvailableProc {
        candidates: Vec<ClaimRequest>,
    },
    #[serde(rename_all = "camelCase")]
    Ack {
        proc_name: String,
    },
    #[serde(rename_all = "camelCase")]
    AckCommit {
        proc_name: String,
        commit_log: CommitLog,
    },
    #[serde(rename_all = "camelCase")]
    Reclaim {
        proc_name: String,
    },
    #[serde(rename_all = "camelCase")]
    Disable {
        proc_name: String,
    },
    #[serde(rename_all = "camelCase")]
    Resume {
        proc_name: String,
    },
    #[serde(rename_all = "camelCase")]
    Destroy {
        proc_name: String,
    },
    #[serde(rename_all = "camelCase")]
    Inspect {
        proc_name: String,
    },
}

/// An entry as sent to a client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryView {
    pub id: String,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// A proc as sent to a client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcView {
    pub name: String,
    pub topic: String,
    pub status: ProcStatus,
    pub offset: String,
    pub created_at: u64,
    pub last_claimed_range: Option<String>,
    pub previous_claimed_range: Option<String>,
    pub last_acked_range: Option<String>,
    pub last_claimed_at: Option<u64>,
    pub last_acked_at: Option<u64>,
    pub reclaims: u32,
    pub max_reclaims: i64,
    pub reclaim_timeout: i64,
    pub on_max_reclaims_reached: OnMaxReclaims,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Reply {
    Committed {
        id: OneOrMany<String>,
    },
    Entries {
        entries: Vec<EntryView>,
    },
    Claimed {
        proc: String,
        result: OneOrMany<EntryView>,
    },
    /// Nothing to hand out; not an error
    Empty,
    /// Acked or reclaimed range
    Range {
        range: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    AckCommitted {
        acked_log_id: Option<String>,
        id: OneOrMany<String>,
    },
    Proc {
        proc: ProcView,
    },
    Error {
        error: String,
    },
}

impl From<BrokerError> for Reply {
    fn from(error: BrokerError) -> Self {
        Reply::Error {
            error: error.code(),
        }
    }
}

/// Client form of an id: the tone counted from zero
pub fn external_id(id: &LogId) -> String {
    format!(
        "{:0width$}-{}",
        id.timestamp,
        id.tone.prev(),
        width = TIMESTAMP_WIDTH
    )
}

pub fn external_range(range: &ClaimRange) -> String {
    format!("{}..{}", external_id(&range.start), external_id(&range.end))
}

/// Core form of a client range token
///
/// Tokens that do not carry a tone, or that are malformed, pass through
/// untouched so the range engine reports them.
pub fn internal_token(token: &str) -> String {
    if let Some(sequence) = token.strip_prefix(':') {
        return match shift_up(sequence) {
            Some(tone) => format!(":{tone}"),
            None => token.to_string(),
        };
    }
    if let Some((ts, tone)) = token.split_once('-')
        && let Some(tone) = shift_up(tone)
    {
        return format!("{ts}-{tone}");
    }
    token.to_string()
}

fn shift_up(digits: &str) -> Option<Tone> {
    shift_tone(digits.parse().ok()?)
}

fn shift_tone(tone: Tone) -> Option<Tone> {
    (tone < Tone::MAX).then(|| tone.next())
}

fn external_offset(offset: Offset) -> String {
    match offset {
        Offset::After(tone) if !tone.is_zero() => tone.prev().value().to_string(),
        Offset::After(_) | Offset::Earliest => ">".to_string(),
        Offset::Latest => "$>".to_string(),
    }
}

fn internal_offset(offset: &str) -> Result<Offset> {
    match offset.parse::<Offset>()? {
        Offset::After(tone) => shift_tone(tone)
            .map(Offset::After)
            .ok_or(BrokerError::InvalidRangeOffset),
        other => Ok(other),
    }
}

fn limit<N: TryFrom<i64>>(value: i64) -> Result<Option<N>> {
    if value < 0 {
        return Ok(None);
    }
    N::try_from(value)
        .map(Some)
        .map_err(|_| BrokerError::InvalidProc)
}

impl ClaimRequest {
    pub fn to_options(&self, broker: &Broker) -> Result<ProcOptions> {
        let defaults = &broker.config().claim_defaults;
        let mut options = ProcOptions::new(&self.name, &self.topic)
            .with_count(self.count.unwrap_or(1))
            .with_max_reclaims(defaults.max_reclaims)
            .with_reclaim_timeout(defaults.reclaim_timeout)
            .with_on_max_reclaims_reached(
                self.on_max_reclaims_reached
                    .unwrap_or(defaults.on_max_reclaims_reached),
            );
        if let Some(offset) = &self.offset {
            options = options.with_offset(internal_offset(offset)?);
        }
        if let Some(max) = self.max_reclaims {
            options = options.with_max_reclaims(limit(max)?);
        }
        if let Some(timeout) = self.reclaim_timeout {
            options = options.with_reclaim_timeout(limit(timeout)?);
        }
        Ok(options)
    }
}

impl CommitLog {
    fn into_commit(self) -> Commit {
        let entry = |e: EntryRequest| NewEntry::new(e.topic, body_text(&e.body));
        match self {
            CommitLog::One(e) => Commit::Single(entry(e)),
            CommitLog::Many(entries) => Commit::Batch(entries.into_iter().map(entry).collect()),
        }
    }
}

/// Stored text of a body; strings are stored as is, other values as JSON
fn body_text(body: &Value) -> String {
    match body {
        Value::String(s) => s.clone(),
        // Null has no body; empty text is rejected by the commit path
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn body_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

pub fn entry_view(entry: &LogEntry) -> EntryView {
    EntryView {
        id: external_id(&entry.id),
        body: body_value(&entry.body),
    }
}

fn committed_ids(committed: &Committed) -> OneOrMany<String> {
    match committed {
        Committed::Single(id) => OneOrMany::One(external_id(id)),
        Committed::Batch(ids) => OneOrMany::Many(ids.iter().map(external_id).collect()),
    }
}

fn claimed_reply(claimed: Claimed, single: bool) -> Reply {
    let mut views: Vec<EntryView> = claimed.entries.iter().map(entry_view).collect();
    let result = match views.pop() {
        Some(view) if single && views.is_empty() => OneOrMany::One(view),
        Some(view) => {
            views.push(view);
            OneOrMany::Many(views)
        }
        None => OneOrMany::Many(Vec::new()),
    };
    Reply::Claimed {
        proc: claimed.proc,
        result,
    }
}

pub fn proc_view(proc: &Proc) -> ProcView {
    let range = |r: &Option<ClaimRange>| r.as_ref().map(external_range);
    ProcView {
        name: proc.name.clone(),
        topic: proc.topic.clone(),
        status: proc.status,
        offset: external_offset(proc.offset),
        created_at: proc.created_at,
        last_claimed_range: range(&proc.last_claimed_range),
        previous_claimed_range: range(&proc.previous_claimed_range),
        last_acked_range: range(&proc.last_acked_range),
        last_claimed_at: proc.last_claimed_at,
        last_acked_at: proc.last_acked_at,
        reclaims: proc.reclaims,
        max_reclaims: proc.max_reclaims.map(i64::from).unwrap_or(-1),
        reclaim_timeout: proc
            .reclaim_timeout
            .and_then(|t| i64::try_from(t).ok())
            .unwrap_or(-1),
        on_max_reclaims_reached: proc.on_max_reclaims_reached,
    }
}

/// Execute one request against the broker
pub fn handle(broker: &mut Broker, request: Request) -> Reply {
    dispatch(broker, request).unwrap_or_else(Reply::from)
}

fn dispatch(broker: &mut Broker, request: Request) -> Result<Reply> {
    let reply = match request {
        Request::Commit { log } => Reply::Committed {
            id: committed_ids(&broker.commit(log.into_commit())?),
        },
        Request::Range {
            topic,
            start,
            end,
            limit,
            exclusive,
            reverse,
        } => {
            let query = RangeQuery::new(topic)
                .start(internal_token(&start))
                .end(internal_token(&end))
                .limit(limit)
                .exclusive(exclusive)
                .reverse(reverse);
            Reply::Entries {
                entries: broker.range(&query)?.iter().map(entry_view).collect(),
            }
        }
        Request::Claim(request) => {
            let options = request.to_options(broker)?;
            match broker.claim(&options)? {
                Some(claimed) => claimed_reply(claimed, options.batch_size() == 1),
                None => Reply::Empty,
            }
        }
        Request::GetAvailableProc { candidates } => {
            let options = candidates
                .iter()
                .map(|c| c.to_options(&*broker))
                .collect::<Result<Vec<_>>>()?;
            match broker.get_available_proc(&options)? {
                Some(claimed) => {
                    let single = options
                        .iter()
                        .find(|o| o.name == claimed.proc)
                        .is_none_or(|o| o.batch_size() == 1);
                    claimed_reply(claimed, single)
                }
                None => Reply::Empty,
            }
        }
        Request::Ack { proc_name } => Reply::Range {
            range: broker.ack(&proc_name)?.as_ref().map(external_range),
        },
        Request::AckCommit {
            proc_name,
            commit_log,
        } => {
            let (acked, committed) = broker.ack_commit(&proc_name, commit_log.into_commit())?;
            Reply::AckCommitted {
                acked_log_id: acked.as_ref().map(external_range),
                id: committed_ids(&committed),
            }
        }
        Request::Reclaim { proc_name } => Reply::Range {
            range: Some(external_range(&broker.reclaim(&proc_name)?)),
        },
        Request::Disable { proc_name } => Reply::Proc {
            proc: proc_view(&broker.disable_proc(&proc_name)?),
        },
        Request::Resume { proc_name } => Reply::Proc {
            proc: proc_view(&broker.resume_proc(&proc_name)?),
        },
        Request::Destroy { proc_name } => Reply::Proc {
            proc: proc_view(&broker.destroy_proc(&proc_name)?),
        },
        Request::Inspect { proc_name } => Reply::Proc {
            proc: proc_view(
                broker
                    .inspect_proc(&proc_name)
                    .ok_or(BrokerError::InvalidProc)?,
            ),
        },
    };
    Ok(reply)
}

/// Decode a JSON request, execute it and encode the reply
pub fn handle_json(broker: &mut Broker, request: &str) -> String {
    let reply = match serde_json::from_str::<Request>(request) {
        Ok(request) => handle(broker, request),
        Err(e) => {
            tracing::warn!("Rejecting malformed request: {}", e);
            Reply::Error {
                error: BrokerError::InvalidRequest.code(),
            }
        }
    };
    serde_json::to_string(&reply).unwrap_or_else(|e| {
        tracing::error!("Failed to encode reply: {}", e);
        String::from(r#"{"type":"error","error":"encoding_failed"}"#)
    })
}

impl BrokerHandle {
    /// Execute a request on the writer task
    pub async fn dispatch(&self, request: Request) -> Reply {
        self.call(move |broker| Ok(handle(broker, request)))
            .await
            .unwrap_or_else(Reply::from)
    }
}
