// SPDX-License-Identifier: MIT OR Apache-2.0
//! The deterministic reactor: a bounded refinement loop over
//! architect/auditor text pairs.
//!
//! Each round normalizes newlines, runs the code-leak gate, parses the
//! strict section contracts, and evaluates three stop conditions —
//! diff-floor stability, circularity (shingle similarity against the
//! round before last), and the round cap. After a stop, further rounds
//! are no-ops. Every round leaves a full record behind so a re-run with
//! the same inputs reproduces the identical history.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod leak;
mod metrics;
mod parsers;
mod reactor;
mod refinement;

pub use leak::{
    check_code_leak, detect_code_leak, LeakDetection, LeakGateMode, WeakMatch,
    DEFAULT_CODE_LEAK_PATTERNS,
};
pub use metrics::{diff_ratio, jaccard_sim, normalize_text, shingles, tokenize};
pub use parsers::{
    normalize_newlines, parse_architect, parse_auditor, ArchitectDoc, AuditorDoc, ParseError,
};
pub use reactor::{
    run_round, ParseErrorRecord, ReactorConfig, ReactorState, RoundMetrics, RoundRecord,
    StopReason,
};
pub use refinement::{
    auditor_incorporation_gaps, carry_forward_gaps, decision_required_ids,
    extract_constraints_ledger, forbidden_pattern_hits, missing_required_sections,
    non_increasing, numeric_day_values, reopened_issues, strip_constraints_block,
    unresolved_issue_count, REQUIRED_REQUIREMENT_SECTIONS,
};
