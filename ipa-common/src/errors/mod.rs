//! Error catalog for ipactl
//!
//! Each error the tool can report carries a stable `IPA-Exxx` code, a
//! category and remediation steps.
//!
//! # Error Code Ranges
//!
//! | Range      | Category    | Description                          |
//! |------------|-------------|--------------------------------------|
//! | E001-E099  | Config      | Configuration and task files         |
//! | E100-E199  | Transport   | Connectivity to the server           |
//! | E200-E299  | Remote      | Faults reported by the server        |
//! | E300-E399  | Schema      | Object type metadata                 |
//! | E400-E499  | Validation  | Rejected requested state             |
//! | E500-E599  | Internal    | Internal/unexpected errors           |

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};
