// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SYNERGY (SGY) - GOSSIP ENVELOPE
//
// Every gossip message is a two-byte head, the chain id, and a small
// keyed multimap of byte blobs. The framing is length-prefixed and
// self-delimiting; the payload blobs themselves are bincode where they
// carry structs. Field order is wire format.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use sgy_core::CHAIN_ID;
use std::collections::BTreeMap;
use thiserror::Error;

// Message heads. These byte values are wire format shared with other
// node implementations; changing any of them partitions the network.
pub const HEAD_HI: [u8; 2] = *b"hi"; // height/tip announce + peer list
pub const HEAD_GH: [u8; 2] = *b"gh"; // get headers (block range request)
pub const HEAD_SH: [u8; 2] = *b"sh"; // send headers (block range response)
pub const HEAD_TX: [u8; 2] = *b"tx"; // transaction gossip, signature-checked
pub const HEAD_BX: [u8; 2] = *b"bx"; // sync-backfill transactions, Merkle-bound
pub const HEAD_ST: [u8; 2] = *b"st"; // missing-transaction request
pub const HEAD_BT: [u8; 2] = *b"bt"; // missing-transaction response
pub const HEAD_NN: [u8; 2] = *b"nn"; // nonce (block-proposal round) gossip
pub const HEAD_BL: [u8; 2] = *b"bl"; // sealed block announce
pub const HEAD_EXIT: [u8; 2] = *b"ex"; // subscription-loop shutdown sentinel

// Topic keys, wire format like the heads.
pub const KEY_LOCAL_HEIGHT: [u8; 2] = *b"LH";
pub const KEY_LOCAL_BEST: [u8; 2] = *b"LB";
pub const KEY_PEERS: [u8; 2] = *b"PP";
pub const KEY_BEGIN_HEIGHT: [u8; 2] = *b"BH";
pub const KEY_END_HEIGHT: [u8; 2] = *b"EH";
/// "sh" heights list, positionally paired with [`KEY_BLOCK_VALUES`].
pub const KEY_ITEM_HEIGHTS: [u8; 2] = *b"IH";
/// "sh" encoded-block list, positionally paired with [`KEY_ITEM_HEIGHTS`].
pub const KEY_BLOCK_VALUES: [u8; 2] = *b"HV";
/// "bl" announce payload: the single encoded block, under the 'N' key.
pub const KEY_BLOCK: [u8; 2] = *b"NV";
/// "tx"/"bx"/"bt" transaction bodies, and "st" requested hashes.
pub const KEY_TRANSACTIONS: [u8; 2] = *b"TT";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("truncated envelope at offset {0}")]
    Truncated(usize),
    #[error("envelope for foreign chain {0}")]
    ForeignChain(i16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipMessage {
    pub head: [u8; 2],
    pub chain_id: i16,
    payload: BTreeMap<[u8; 2], Vec<Vec<u8>>>,
}

impl GossipMessage {
    pub fn new(head: [u8; 2]) -> Self {
        Self {
            head,
            chain_id: CHAIN_ID,
            payload: BTreeMap::new(),
        }
    }

    pub fn exit() -> Self {
        Self::new(HEAD_EXIT)
    }

    pub fn is_exit(&self) -> bool {
        self.head == HEAD_EXIT
    }

    pub fn put(mut self, key: [u8; 2], value: Vec<u8>) -> Self {
        self.payload.entry(key).or_default().push(value);
        self
    }

    pub fn put_many(mut self, key: [u8; 2], values: Vec<Vec<u8>>) -> Self {
        self.payload.entry(key).or_default().extend(values);
        self
    }

    pub fn put_i64(self, key: [u8; 2], value: i64) -> Self {
        self.put(key, value.to_le_bytes().to_vec())
    }

    pub fn first(&self, key: &[u8; 2]) -> Option<&[u8]> {
        self.payload.get(key)?.first().map(|v| v.as_slice())
    }

    pub fn items(&self, key: &[u8; 2]) -> &[Vec<u8>] {
        self.payload.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn get_i64(&self, key: &[u8; 2]) -> Option<i64> {
        let bytes: [u8; 8] = self.first(key)?.try_into().ok()?;
        Some(i64::from_le_bytes(bytes))
    }

    /// head ‖ chain_id ‖ u16 topic count ‖ per topic: key ‖ u32 item
    /// count ‖ per item: u32 length ‖ bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        out.extend_from_slice(&self.head);
        out.extend_from_slice(&self.chain_id.to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        for (key, items) in &self.payload {
            out.extend_from_slice(key);
            out.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                out.extend_from_slice(&(item.len() as u32).to_le_bytes());
                out.extend_from_slice(item);
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let mut cursor = Cursor { bytes, pos: 0 };
        let head: [u8; 2] = cursor.take(2)?.try_into().expect("length checked");
        let chain_id = i16::from_le_bytes(cursor.take(2)?.try_into().expect("length checked"));
        if chain_id != CHAIN_ID {
            return Err(EnvelopeError::ForeignChain(chain_id));
        }
        let topics = u16::from_le_bytes(cursor.take(2)?.try_into().expect("length checked"));
        let mut payload = BTreeMap::new();
        for _ in 0..topics {
            let key: [u8; 2] = cursor.take(2)?.try_into().expect("length checked");
            let count = u32::from_le_bytes(cursor.take(4)?.try_into().expect("length checked"));
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let len =
                    u32::from_le_bytes(cursor.take(4)?.try_into().expect("length checked"));
                items.push(cursor.take(len as usize)?.to_vec());
            }
            payload.insert(key, items);
        }
        Ok(Self {
            head,
            chain_id,
            payload,
        })
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], EnvelopeError> {
        if self.pos + n > self.bytes.len() {
            return Err(EnvelopeError::Truncated(self.pos));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }
}
