//! On-chain group account decoding.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! [account_tag (u8)]
//! [creator (32)]
//! [name (u32 len + bytes)]
//! [visibility (u8)]
//! [open (u8)]
//! [capacity (u16)]
//! [member_count (u16)]
//! member_count × [wallet (32), user_id (u32 len + bytes),
//!                 is_trader (u8), contribution (u64), joined_at (i64)]
//! ```

use crate::chain::{ChainError, OnChainGroupState, OnChainMember};
use crate::shared::UserId;
use solana_pubkey::Pubkey;

/// Discriminator byte for group accounts.
pub const GROUP_ACCOUNT_TAG: u8 = 1;

/// Decoded group account.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupAccount {
    pub creator: Pubkey,
    pub name: String,
    pub private: bool,
    pub open: bool,
    pub capacity: u16,
    pub members: Vec<GroupAccountMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupAccountMember {
    pub wallet: Pubkey,
    pub user_id: String,
    pub is_trader: bool,
    pub contribution: u64,
    pub joined_at: i64,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ChainError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| ChainError::Decode(format!("truncated at offset {}", self.pos)))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, ChainError> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, ChainError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, ChainError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, ChainError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_i64(&mut self) -> Result<i64, ChainError> {
        Ok(self.read_u64()? as i64)
    }

    fn read_pubkey(&mut self) -> Result<Pubkey, ChainError> {
        let b = self.take(32)?;
        let mut buf = [0u8; 32];
        buf.copy_from_slice(b);
        Ok(Pubkey::new_from_array(buf))
    }

    fn read_string(&mut self) -> Result<String, ChainError> {
        let len = self.read_u32()? as usize;
        let b = self.take(len)?;
        String::from_utf8(b.to_vec()).map_err(|e| ChainError::Decode(e.to_string()))
    }
}

/// Decode a raw group account.
pub fn decode_group_account(data: &[u8]) -> Result<GroupAccount, ChainError> {
    let mut cur = Cursor::new(data);

    let tag = cur.read_u8()?;
    if tag != GROUP_ACCOUNT_TAG {
        return Err(ChainError::Decode(format!(
            "unexpected account tag {tag}, want {GROUP_ACCOUNT_TAG}"
        )));
    }

    let creator = cur.read_pubkey()?;
    let name = cur.read_string()?;
    let private = cur.read_u8()? != 0;
    let open = cur.read_u8()? != 0;
    let capacity = cur.read_u16()?;
    let member_count = cur.read_u16()? as usize;

    if member_count > capacity as usize {
        return Err(ChainError::Decode(format!(
            "member count {member_count} exceeds capacity {capacity}"
        )));
    }

    let mut members = Vec::with_capacity(member_count);
    for _ in 0..member_count {
        members.push(GroupAccountMember {
            wallet: cur.read_pubkey()?,
            user_id: cur.read_string()?,
            is_trader: cur.read_u8()? != 0,
            contribution: cur.read_u64()?,
            joined_at: cur.read_i64()?,
        });
    }

    Ok(GroupAccount {
        creator,
        name,
        private,
        open,
        capacity,
        members,
    })
}

/// Convert a decoded account into the chain-agnostic state shape.
pub fn to_group_state(account: GroupAccount, address: &Pubkey, lamports: u64) -> OnChainGroupState {
    OnChainGroupState {
        address: address.to_string(),
        open: account.open,
        members: account
            .members
            .into_iter()
            .map(|m| OnChainMember {
                user: UserId::from(m.user_id),
                wallet: m.wallet.to_string(),
                is_trader: m.is_trader,
                contribution: m.contribution,
            })
            .collect(),
        balance: lamports,
    }
}
