//! Query Facade (L2, SPEC_FULL §4.2): a namespace-safe wrapper over the
//! graph store client (L1, `crate::graph::GraphEngine` + `crate::storage`).
//!
//! Every safe method builds an actual `MATCH (alias:Label {...}) RETURN ...`
//! query string via `query::build_match_query` before it ever touches the
//! engine, so the facade's "forces explicit node labels" responsibility is
//! realized both by construction (every safe method hard-codes its label)
//! and in the emitted text itself (Testable Property 8); only `execute_raw`
//! accepts a caller-supplied, unconstrained filter — the escape hatch
//! `crate::graph::GraphStore` implementations cannot prevent by
//! construction. The `query` module implements the rest of the L1 contract
//! named by §4.1: parameter escaping, `::vertex`/`::edge`/`::path` suffix
//! stripping plus JSON parsing, and column-spec computation from the RETURN
//! clause. The `WHERE` boolean expression itself stays a Rust closure
//! (`impl Fn(&Node) -> bool`) rather than a parsed expression language — see
//! DESIGN.md for the scoping rationale. This mirrors the teacher's
//! `PlexusEngine` callers never bypassing `ContextId` scoping, generalized to
//! explicit `NodeLabel` scoping per SPEC_FULL §4.1/§4.2.

mod audit;
mod facade;
mod query;

pub use audit::{AuditLog, AuditSnapshot};
pub use facade::{GraphStats, QueryFacade, QueryFacadeError, QueryFacadeResult};
pub use query::{
    build_match_query, compute_column_spec, escape_param, is_expected_race_condition, parse_return_value,
    substitute_params,
};
