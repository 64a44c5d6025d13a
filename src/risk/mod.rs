//! Risk rules and protective-level policy
//!
//! Pure, deterministic price math: entry stop/target computation under
//! broker distance constraints, breakeven escalation and trailing-stop
//! tightening. No I/O lives here.

mod policy;
mod rules;

pub use policy::RiskPolicy;
pub use rules::{RiskRules, SourceDistances, SymbolRules};
