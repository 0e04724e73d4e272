//! Account Locking Policy
//!
//! Row locks for a transfer are always taken lower account id first. Two
//! transfers over the same pair, in either direction, therefore request the
//! locks in the same sequence and can never wait on each other in a cycle.

use crate::domain::LedgerError;

/// Acquisition order for the two account row locks of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOrder {
    pub first: i64,
    pub second: i64,
}

impl LockOrder {
    /// Order the locks for a transfer between two distinct accounts.
    ///
    /// # Errors
    /// - `LedgerError::InvalidArgument` if both ids are the same account
    pub fn for_pair(from_account_id: i64, to_account_id: i64) -> Result<Self, LedgerError> {
        if from_account_id == to_account_id {
            return Err(LedgerError::invalid_argument(
                "cannot transfer to the same account",
            ));
        }

        let (first, second) = if from_account_id < to_account_id {
            (from_account_id, to_account_id)
        } else {
            (to_account_id, from_account_id)
        };
        Ok(Self { first, second })
    }

    /// Ids in acquisition order
    pub fn as_array(&self) -> [i64; 2] {
        [self.first, self.second]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_id_first_regardless_of_direction() {
        let forward = LockOrder::for_pair(3, 9).unwrap();
        let backward = LockOrder::for_pair(9, 3).unwrap();

        assert_eq!(forward, backward);
        assert_eq!(forward.as_array(), [3, 9]);
    }

    #[test]
    fn test_self_transfer_is_rejected() {
        match LockOrder::for_pair(5, 5) {
            Err(LedgerError::InvalidArgument(msg)) => assert!(msg.contains("same account")),
            other => panic!("Expected InvalidArgument, got: {:?}", other),
        }
    }

    #[test]
    fn test_order_is_total() {
        let ids = [1_i64, 2, 17, 400, i64::MAX];
        for &a in &ids {
            for &b in &ids {
                if a == b {
                    continue;
                }
                let order = LockOrder::for_pair(a, b).unwrap();
                assert!(order.first < order.second);
                assert_eq!(order, LockOrder::for_pair(b, a).unwrap());
            }
        }
    }
}
