/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: recipients.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-02 11:20:37
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-03 16:44:08
 */

use lettre::Address;
use std::fmt;

/// Ordered, never empty list of delivery addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipients(Vec<Address>);

/// Who a single job delivers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientTarget {
    Single(Address),
    All(Vec<Address>),
}

impl Recipients {
    /// Parses every address. Entries may be comma separated lists themselves.
    pub fn parse<S: AsRef<str>>(addresses: &[S]) -> anyhow::Result<Self> {
        let parsed = addresses
            .iter()
            .flat_map(|entry| entry.as_ref().split(','))
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(|addr| {
                addr.parse::<Address>()
                    .map_err(|e| anyhow::anyhow!("Invalid recipient address {}: {}", addr, e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Self::new(parsed)
    }

    pub fn new(addresses: Vec<Address>) -> anyhow::Result<Self> {
        if addresses.is_empty() {
            return Err(anyhow::anyhow!("At least one recipient is required"));
        }
        Ok(Self(addresses))
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[Address] {
        &self.0
    }

    /// Round robin for normal runs, the whole list when broadcasting.
    pub fn target_for(&self, index: usize, broadcast: bool) -> RecipientTarget {
        if broadcast {
            RecipientTarget::All(self.0.clone())
        } else {
            RecipientTarget::Single(self.0[index % self.0.len()].clone())
        }
    }
}

impl From<Address> for Recipients {
    fn from(address: Address) -> Self {
        Self(vec![address])
    }
}

impl RecipientTarget {
    pub fn addresses(&self) -> Vec<Address> {
        match self {
            RecipientTarget::Single(addr) => vec![addr.clone()],
            RecipientTarget::All(addrs) => addrs.clone(),
        }
    }
}

impl fmt::Display for RecipientTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipientTarget::Single(addr) => write!(f, "{}", addr),
            RecipientTarget::All(addrs) => {
                let joined: Vec<String> = addrs.iter().map(|a| a.to_string()).collect();
                write!(f, "{}", joined.join(", "))
            }
        }
    }
}
