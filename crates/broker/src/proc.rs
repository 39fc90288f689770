//! Proc records and their pure state transitions
//!
//! A proc is a named consumer cursor bound to one topic. Its persisted form is
//! one key per field; [`Proc::fields`] and [`Proc::apply_field`] are the two
//! halves of that encoding.

use crate::error::{BrokerError, Result};
use crate::id::ClaimRange;
use crate::keys;
use crate::tone::Tone;
use crate::txn::{Staged, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_MAX_RECLAIMS: u32 = 10;
pub const DEFAULT_RECLAIM_TIMEOUT: u64 = 10_000;

/// Persisted form of "unlimited" / "never"
const UNLIMITED: &str = "-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcStatus {
    Active,
    Disabled,
}

impl fmt::Display for ProcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcStatus::Active => write!(f, "active"),
            ProcStatus::Disabled => write!(f, "disabled"),
        }
    }
}

impl FromStr for ProcStatus {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(ProcStatus::Active),
            "disabled" => Ok(ProcStatus::Disabled),
            other => Err(BrokerError::CorruptState(format!("proc status {other}"))),
        }
    }
}

/// What happens when `reclaims` reaches `max_reclaims`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnMaxReclaims {
    #[default]
    Disable,
    Continue,
}

impl fmt::Display for OnMaxReclaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnMaxReclaims::Disable => write!(f, "disable"),
            OnMaxReclaims::Continue => write!(f, "continue"),
        }
    }
}

impl FromStr for OnMaxReclaims {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "disable" => Ok(OnMaxReclaims::Disable),
            "continue" => Ok(OnMaxReclaims::Continue),
            other => Err(BrokerError::CorruptState(format!(
                "onMaxReclaimsReached {other}"
            ))),
        }
    }
}

/// Where a new proc starts reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Offset {
    /// `>`: from the first entry of the topic
    #[default]
    Earliest,
    /// `$>`: only entries committed after the proc is created
    Latest,
    /// A literal sequence: resume after this tone
    After(Tone),
}

impl Offset {
    /// Tone the first claim resumes after
    pub fn start_tone(self, current: Tone) -> Tone {
        match self {
            Offset::Earliest => Tone::ZERO,
            Offset::Latest => current,
            Offset::After(tone) => tone,
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Offset::Earliest => write!(f, ">"),
            Offset::Latest => write!(f, "$>"),
            Offset::After(tone) => write!(f, "{tone}"),
        }
    }
}

impl FromStr for Offset {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | ">" => Ok(Offset::Earliest),
            "$>" => Ok(Offset::Latest),
            digits => Ok(Offset::After(digits.parse()?)),
        }
    }
}

/// Claim request: identifies the proc and carries its creation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcOptions {
    pub name: String,
    pub topic: String,
    pub offset: Offset,
    /// Entries per claim; zero is treated as one
    pub count: usize,
    pub max_reclaims: Option<u32>,
    pub reclaim_timeout: Option<u64>,
    pub on_max_reclaims_reached: OnMaxReclaims,
}

impl ProcOptions {
    pub fn new(name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            offset: Offset::Earliest,
            count: 1,
            max_reclaims: Some(DEFAULT_MAX_RECLAIMS),
            reclaim_timeout: Some(DEFAULT_RECLAIM_TIMEOUT),
            on_max_reclaims_reached: OnMaxReclaims::Disable,
        }
    }

    pub fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_max_reclaims(mut self, max: Option<u32>) -> Self {
        self.max_reclaims = max;
        self
    }

    pub fn with_reclaim_timeout(mut self, timeout_ms: Option<u64>) -> Self {
        self.reclaim_timeout = timeout_ms;
        self
    }

    pub fn with_on_max_reclaims_reached(mut self, policy: OnMaxReclaims) -> Self {
        self.on_max_reclaims_reached = policy;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.count.max(1)
    }
}

/// A consumer cursor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proc {
    pub name: String,
    pub topic: String,
    pub status: ProcStatus,
    #[serde(serialize_with = "serialize_display")]
    pub offset: Offset,
    pub created_at: u64,
    pub last_claimed_range: Option<ClaimRange>,
    pub previous_claimed_range: Option<ClaimRange>,
    pub last_acked_range: Option<ClaimRange>,
    pub last_claimed_at: Option<u64>,
    pub last_acked_at: Option<u64>,
    pub reclaims: u32,
    pub max_reclaims: Option<u32>,
    pub reclaim_timeout: Option<u64>,
    pub on_max_reclaims_reached: OnMaxReclaims,
}

fn serialize_display<S: serde::Serializer>(
    value: &Offset,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

impl Proc {
    /// A fresh proc; `$>` is pinned to the topic's tone at creation
    pub fn create(options: &ProcOptions, now: u64, current_tone: Tone) -> Self {
        let offset = match options.offset {
            Offset::Latest => Offset::After(current_tone),
            other => other,
        };
        Self {
            offset,
            created_at: now,
            max_reclaims: options.max_reclaims,
            reclaim_timeout: options.reclaim_timeout,
            on_max_reclaims_reached: options.on_max_reclaims_reached,
            ..Self::blank(&options.topic, &options.name)
        }
    }

    /// Empty record used as the target of field-by-field restoration
    pub fn blank(topic: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            topic: topic.to_string(),
            status: ProcStatus::Active,
            offset: Offset::Earliest,
            created_at: 0,
            last_claimed_range: None,
            previous_claimed_range: None,
            last_acked_range: None,
            last_claimed_at: None,
            last_acked_at: None,
            reclaims: 0,
            max_reclaims: Some(DEFAULT_MAX_RECLAIMS),
            reclaim_timeout: Some(DEFAULT_RECLAIM_TIMEOUT),
            on_max_reclaims_reached: OnMaxReclaims::Disable,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ProcStatus::Active
    }

    pub fn is_disabled(&self) -> bool {
        self.status == ProcStatus::Disabled
    }

    /// Claimed but not yet acked
    pub fn has_outstanding_claim(&self) -> bool {
        self.last_claimed_range != self.last_acked_range
    }

    /// Last tone this proc is done with; the next claim starts after it
    pub fn resume_tone(&self) -> Tone {
        self.last_acked_range
            .map(|range| range.end.tone)
            .unwrap_or_else(|| self.offset.start_tone(Tone::ZERO))
    }

    /// True when the topic holds tones past the resume point
    pub fn has_unconsumed(&self, current_tone: Tone) -> bool {
        current_tone > self.resume_tone()
    }

    /// The outstanding claim is older than the reclaim timeout
    pub fn claim_timed_out(&self, now: u64) -> bool {
        let (Some(timeout), Some(claimed_at)) = (self.reclaim_timeout, self.last_claimed_at) else {
            return false;
        };
        self.has_outstanding_claim() && now.saturating_sub(claimed_at) > timeout
    }

    /// Lowest tone this proc could still be handed again
    ///
    /// Everything below it is safe to collect as far as this proc is
    /// concerned.
    pub fn protected_tone(&self) -> Tone {
        match self.previous_claimed_range {
            Some(range) => range.start.tone.prev(),
            None => self.resume_tone(),
        }
    }

    pub fn record_claim(&mut self, range: ClaimRange, now: u64) {
        self.previous_claimed_range = self.last_claimed_range;
        self.last_claimed_range = Some(range);
        self.last_claimed_at = Some(now);
    }

    /// Acknowledge whatever was claimed last
    pub fn record_ack(&mut self, now: u64) -> Option<ClaimRange> {
        self.last_acked_range = self.last_claimed_range;
        self.last_acked_at = Some(now);
        self.reclaims = 0;
        self.last_acked_range
    }

    /// Give the outstanding claim back; returns the range given back
    pub fn reclaim(&mut self) -> Result<ClaimRange> {
        if self.is_disabled() {
            return Err(BrokerError::ProcIsDisabled);
        }
        if !self.has_outstanding_claim() {
            return Err(BrokerError::NothingToReclaim);
        }
        let given_back = self.last_claimed_range.ok_or(BrokerError::NothingToReclaim)?;

        self.last_claimed_range = self.previous_claimed_range;
        self.reclaims += 1;

        if self.on_max_reclaims_reached == OnMaxReclaims::Disable
            && let Some(max) = self.max_reclaims
            && self.reclaims >= max
        {
            self.status = ProcStatus::Disabled;
        }
        Ok(given_back)
    }

    pub fn disable(&mut self) -> Result<()> {
        if self.is_disabled() {
            return Err(BrokerError::ProcAlreadyDisabled);
        }
        self.status = ProcStatus::Disabled;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.is_active() {
            return Err(BrokerError::ProcAlreadyActive);
        }
        self.status = ProcStatus::Active;
        self.reclaims = 0;
        Ok(())
    }

    /// Persisted `(field, value)` pairs
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("topic", self.topic.clone()),
            ("status", self.status.to_string()),
            ("offset", self.offset.to_string()),
            ("createdAt", self.created_at.to_string()),
            (
                "lastClaimedRange",
                ClaimRange::format_optional(&self.last_claimed_range),
            ),
            (
                "previousClaimedRange",
                ClaimRange::format_optional(&self.previous_claimed_range),
            ),
            (
                "lastAckedRange",
                ClaimRange::format_optional(&self.last_acked_range),
            ),
            ("lastClaimedAt", format_time(self.last_claimed_at)),
            ("lastAckedAt", format_time(self.last_acked_at)),
            ("reclaims", self.reclaims.to_string()),
            ("maxReclaims", format_limit(self.max_reclaims)),
            ("reclaimTimeout", format_limit(self.reclaim_timeout)),
            (
                "onMaxReclaimsReached",
                self.on_max_reclaims_reached.to_string(),
            ),
        ]
    }

    /// Set one persisted field; returns false for a field name it does not know
    pub fn apply_field(&mut self, field: &str, value: &str) -> Result<bool> {
        match field {
            "name" => self.name = value.to_string(),
            "topic" => self.topic = value.to_string(),
            "status" => self.status = value.parse()?,
            "offset" => self.offset = value.parse().map_err(|_| corrupt(field, value))?,
            "createdAt" => self.created_at = parse_number(field, value)?,
            "lastClaimedRange" => self.last_claimed_range = parse_range(field, value)?,
            "previousClaimedRange" => self.previous_claimed_range = parse_range(field, value)?,
            "lastAckedRange" => self.last_acked_range = parse_range(field, value)?,
            "lastClaimedAt" => self.last_claimed_at = parse_time(field, value)?,
            "lastAckedAt" => self.last_acked_at = parse_time(field, value)?,
            "reclaims" => self.reclaims = parse_number(field, value)?,
            "maxReclaims" => self.max_reclaims = parse_limit(field, value)?,
            "reclaimTimeout" => self.reclaim_timeout = parse_limit(field, value)?,
            "onMaxReclaimsReached" => self.on_max_reclaims_reached = value.parse()?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Writes every field of this proc
    pub fn transaction(&self) -> Transaction {
        let mut txn = Transaction::new();
        for (field, value) in self.fields() {
            txn.put(keys::proc_field_key(&self.topic, &self.name, field), value);
        }
        txn
    }

    /// Persist this record and install it in the registry once durable
    pub fn stage_save(self) -> Staged<Proc> {
        let txn = self.transaction();
        Staged::new(txn, move |state| {
            state.procs.upsert(self.clone());
            self
        })
    }
}

fn corrupt(field: &str, value: &str) -> BrokerError {
    BrokerError::CorruptState(format!("proc field {field}={value}"))
}

fn parse_number<N: FromStr>(field: &str, value: &str) -> Result<N> {
    value.parse().map_err(|_| corrupt(field, value))
}

fn parse_range(field: &str, value: &str) -> Result<Option<ClaimRange>> {
    ClaimRange::parse_optional(value).map_err(|_| corrupt(field, value))
}

fn format_time(at: Option<u64>) -> String {
    at.map(|ms| ms.to_string()).unwrap_or_default()
}

fn parse_time(field: &str, value: &str) -> Result<Option<u64>> {
    if value.is_empty() {
        return Ok(None);
    }
    parse_number(field, value).map(Some)
}

fn format_limit<N: ToString>(limit: Option<N>) -> String {
    limit
        .map(|n| n.to_string())
        .unwrap_or_else(|| UNLIMITED.to_string())
}

fn parse_limit<N: FromStr>(field: &str, value: &str) -> Result<Option<N>> {
    if value == UNLIMITED {
        return Ok(None);
    }
    parse_number(field, value).map(Some)
}
