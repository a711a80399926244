//! Program-derived addresses for the group program.

use solana_pubkey::Pubkey;

/// Seed prefix for group accounts.
pub const GROUP_SEED: &[u8] = b"group";

/// Derive the group PDA for `(name, creator)`.
///
/// The derivation is deterministic: the same name and creator always resolve
/// to the same address, which is what makes failed creations recoverable.
pub fn get_group_pda(name: &str, creator: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[GROUP_SEED, name.as_bytes(), creator.as_ref()], program_id)
}
