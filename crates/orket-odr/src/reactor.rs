// SPDX-License-Identifier: MIT OR Apache-2.0
//! The round stepper.

use crate::leak::{detect_code_leak, LeakGateMode, DEFAULT_CODE_LEAK_PATTERNS};
use crate::metrics::{diff_ratio, jaccard_sim};
use crate::parsers::{normalize_newlines, parse_architect, parse_auditor, ArchitectDoc, AuditorDoc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the reactor stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopReason {
    /// The code-leak gate fired.
    CodeLeak,
    /// A role violated its section contract.
    ShapeViolation,
    /// Consecutive requirement versions stayed under the diff floor.
    DiffFloor,
    /// The requirement circled back to an earlier version.
    Circularity,
    /// The configured round cap was reached.
    MaxRounds,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CodeLeak => "CODE_LEAK",
            Self::ShapeViolation => "SHAPE_VIOLATION",
            Self::DiffFloor => "DIFF_FLOOR",
            Self::Circularity => "CIRCULARITY",
            Self::MaxRounds => "MAX_ROUNDS",
        })
    }
}

/// Reactor tuning. The defaults match the production loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReactorConfig {
    /// Hard cap on accepted rounds.
    pub max_rounds: usize,
    /// Diff ratio below which a round counts as stable.
    pub diff_floor_pct: f64,
    /// Consecutive stable rounds required for `DIFF_FLOOR`.
    pub stable_rounds: usize,
    /// Shingle size for similarity metrics.
    pub shingle_k: usize,
    /// How much `sim_loop` must exceed `sim_prev` for circularity.
    pub margin: f64,
    /// Minimum `sim_loop` for circularity.
    pub min_loop_sim: f64,
    /// Code-leak gate mode.
    pub leak_gate_mode: LeakGateMode,
    /// Hard-leak regexes for `strict` mode.
    pub code_leak_patterns: Vec<String>,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            max_rounds: 8,
            diff_floor_pct: 0.05,
            stable_rounds: 2,
            shingle_k: 3,
            margin: 0.02,
            min_loop_sim: 0.65,
            leak_gate_mode: LeakGateMode::default(),
            code_leak_patterns: DEFAULT_CODE_LEAK_PATTERNS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        }
    }
}

/// Per-round convergence metrics. `None` entries were not computable yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundMetrics {
    /// Whether the leak gate fired this round.
    pub code_leak_hit: bool,
    /// Accepted requirement count after this round.
    pub n: usize,
    /// Length-based diff ratio against the previous requirement.
    pub diff_ratio: Option<f64>,
    /// Shingle similarity against the previous requirement.
    pub sim_prev: Option<f64>,
    /// Shingle similarity against the requirement before last.
    pub sim_loop: Option<f64>,
    /// Consecutive rounds under the diff floor.
    pub stable_count: usize,
}

impl RoundMetrics {
    fn base(n: usize, code_leak_hit: bool, stable_count: usize) -> Self {
        Self {
            code_leak_hit,
            n,
            diff_ratio: None,
            sim_prev: None,
            sim_loop: None,
            stable_count,
        }
    }
}

/// A parse error attributed to its source role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseErrorRecord {
    /// `architect` or `auditor`.
    pub source: String,
    /// Stable parse error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Everything one round leaves behind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 1-based round index.
    pub round: usize,
    /// Config snapshot the round ran under.
    pub run_config: ReactorConfig,
    /// Normalized architect input.
    pub architect_raw: String,
    /// Normalized auditor input.
    pub auditor_raw: String,
    /// Parsed architect sections, when parsing succeeded.
    pub architect_parsed: Option<ArchitectDoc>,
    /// Parsed auditor sections, when parsing succeeded.
    pub auditor_parsed: Option<AuditorDoc>,
    /// Contract violations, when parsing failed.
    pub parse_errors: Vec<ParseErrorRecord>,
    /// Convergence metrics.
    pub metrics: RoundMetrics,
    /// Stop reason set by this round, if any.
    pub stop_reason: Option<StopReason>,
}

/// Accumulated reactor state across rounds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactorState {
    /// Accepted requirement versions.
    pub history_v: Vec<String>,
    /// One record per attempted round.
    pub history_rounds: Vec<RoundRecord>,
    /// Consecutive rounds under the diff floor.
    pub stable_count: usize,
    /// Set once; all later rounds are no-ops.
    pub stop_reason: Option<StopReason>,
}

impl ReactorState {
    /// Fresh state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Execute one round. A stopped reactor ignores further input.
pub fn run_round(
    state: &mut ReactorState,
    architect_raw: &str,
    auditor_raw: &str,
    cfg: &ReactorConfig,
) {
    if state.stop_reason.is_some() {
        return;
    }

    let architect_raw = normalize_newlines(architect_raw);
    let auditor_raw = normalize_newlines(auditor_raw);
    let round_idx = state.history_rounds.len() + 1;
    let attempted_n = state.history_v.len() + 1;

    let detection = detect_code_leak(
        &architect_raw,
        &auditor_raw,
        cfg.leak_gate_mode,
        Some(&cfg.code_leak_patterns),
    );
    if detection.hard_leak {
        state.history_rounds.push(RoundRecord {
            round: round_idx,
            run_config: cfg.clone(),
            architect_raw,
            auditor_raw,
            architect_parsed: None,
            auditor_parsed: None,
            parse_errors: Vec::new(),
            metrics: RoundMetrics::base(attempted_n, true, state.stable_count),
            stop_reason: Some(StopReason::CodeLeak),
        });
        state.stop_reason = Some(StopReason::CodeLeak);
        return;
    }

    let architect_parse = parse_architect(&architect_raw);
    let auditor_parse = parse_auditor(&auditor_raw);
    let mut parse_errors = Vec::new();
    if let Err(error) = &architect_parse {
        parse_errors.push(ParseErrorRecord {
            source: "architect".to_string(),
            code: error.code.clone(),
            message: error.message.clone(),
        });
    }
    if let Err(error) = &auditor_parse {
        parse_errors.push(ParseErrorRecord {
            source: "auditor".to_string(),
            code: error.code.clone(),
            message: error.message.clone(),
        });
    }
    if !parse_errors.is_empty() {
        state.history_rounds.push(RoundRecord {
            round: round_idx,
            run_config: cfg.clone(),
            architect_raw,
            auditor_raw,
            architect_parsed: None,
            auditor_parsed: None,
            parse_errors,
            metrics: RoundMetrics::base(attempted_n, false, state.stable_count),
            stop_reason: Some(StopReason::ShapeViolation),
        });
        state.stop_reason = Some(StopReason::ShapeViolation);
        return;
    }

    let architect_doc = architect_parse.expect("checked above");
    let auditor_doc = auditor_parse.expect("checked above");
    state.history_v.push(architect_doc.requirement.clone());
    let n = state.history_v.len();

    let mut metrics = RoundMetrics::base(n, false, state.stable_count);

    let mut diff_hit = false;
    if n >= 2 {
        let ratio = diff_ratio(&state.history_v[n - 1], &state.history_v[n - 2]);
        metrics.diff_ratio = Some(ratio);
        if ratio < cfg.diff_floor_pct {
            state.stable_count += 1;
        } else {
            state.stable_count = 0;
        }
        metrics.stable_count = state.stable_count;
        diff_hit = state.stable_count >= cfg.stable_rounds;
    }

    let mut circ_hit = false;
    if n >= 3 {
        let sim_prev = jaccard_sim(&state.history_v[n - 1], &state.history_v[n - 2], cfg.shingle_k);
        let sim_loop = jaccard_sim(&state.history_v[n - 1], &state.history_v[n - 3], cfg.shingle_k);
        metrics.sim_prev = Some(sim_prev);
        metrics.sim_loop = Some(sim_loop);
        circ_hit = sim_loop > sim_prev + cfg.margin && sim_loop >= cfg.min_loop_sim;
    }

    let stop_reason = if n == cfg.max_rounds {
        Some(StopReason::MaxRounds)
    } else if diff_hit {
        Some(StopReason::DiffFloor)
    } else if circ_hit {
        Some(StopReason::Circularity)
    } else {
        None
    };

    state.history_rounds.push(RoundRecord {
        round: round_idx,
        run_config: cfg.clone(),
        architect_raw,
        auditor_raw,
        architect_parsed: Some(architect_doc),
        auditor_parsed: Some(auditor_doc),
        parse_errors: Vec::new(),
        metrics,
        stop_reason,
    });
    if stop_reason.is_some() {
        state.stop_reason = stop_reason;
    }
}
