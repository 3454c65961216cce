// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Local Sovereign Index.
//!
//! A two-tier staging/committed index of content-addressed JSON triplets
//! (body / links / manifest). Staging is namespaced by `(run_id, turn_id)`;
//! the committed scope is the single atomically-swapped truth. Link
//! integrity is validated with strict Self → Staging → Committed
//! visibility, and sequential turn promotion moves staged state into the
//! committed directory all-or-nothing.
//!
//! Disk anatomy, rooted at `<workspace>/index/`:
//!
//! ```text
//! index/
//!   committed/
//!     index/run_ledger.json
//!     objects/<xx>/<digest>
//!     triplets/<stem>.json
//!     refs/by_id/<fs_token(type)>/<fs_token(id)>.json
//!   staging/<fs_token(run_id)>/<fs_token(turn_id)>/…
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod index;
mod layout;
mod links;
mod promotion;
mod validate;

pub use index::{LocalSovereignIndex, LsiError, RefSource, TripletDigests};
pub use layout::{parse_turn_index, Scope, ScopePaths, LSI_VERSION};
pub use links::{is_ref_object, refs_from_links, LinkRef};
pub use promotion::{promote_turn, promote_turn_with_fault, FaultPoint, PromotionResult};
pub use validate::validate_links_against_index;
