// ── Domain model ──
//
// Sample game-state types used by the adapters' tests and the CLI. Field
// names are camelCase on the wire to stay compatible with stored data.

pub mod account_id;
pub mod game;

pub use account_id::AccountId;
pub use game::{GameSettings, Player};
