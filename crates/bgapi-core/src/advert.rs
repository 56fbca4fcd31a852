//! Advertisement payload parsing
//!
//! Scan responses carry a sequence of length-prefixed AD structures:
//! `len, type, data[len-1]` repeated until the payload runs out. The walk
//! is tolerant: a zero length or a record running past the end of the
//! buffer terminates parsing with whatever was recovered so far, since
//! peers routinely pad or truncate this field.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// AD type codes relevant to discovery.
pub const AD_FLAGS: u8 = 0x01;
pub const AD_SERVICES_16_INCOMPLETE: u8 = 0x02;
pub const AD_SERVICES_16_COMPLETE: u8 = 0x03;
pub const AD_SERVICES_128_INCOMPLETE: u8 = 0x06;
pub const AD_SERVICES_128_COMPLETE: u8 = 0x07;
pub const AD_LOCAL_NAME_SHORTENED: u8 = 0x08;
pub const AD_LOCAL_NAME_COMPLETE: u8 = 0x09;
pub const AD_TX_POWER: u8 = 0x0a;
pub const AD_MANUFACTURER_SPECIFIC: u8 = 0xff;

/// A parsed advertisement or scan-response payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    /// AD type to data, first occurrence wins on duplicates.
    pub fields: HashMap<u8, Vec<u8>>,
    /// Device name from the first shortened or complete local-name field.
    pub name: Option<String>,
}

impl Advertisement {
    /// Walk the TLV records of a raw advertisement payload.
    pub fn parse(raw: &[u8]) -> Self {
        let mut fields: HashMap<u8, Vec<u8>> = HashMap::new();
        let mut name = None;

        let mut rest = raw;
        while let [len, tail @ ..] = rest {
            let len = *len as usize;
            if len == 0 || len > tail.len() {
                break;
            }
            let (record, remainder) = tail.split_at(len);
            let (ad_type, data) = (record[0], &record[1..]);

            if name.is_none()
                && (ad_type == AD_LOCAL_NAME_SHORTENED || ad_type == AD_LOCAL_NAME_COMPLETE)
            {
                name = Some(String::from_utf8_lossy(data).into_owned());
            }
            fields.entry(ad_type).or_insert_with(|| data.to_vec());

            rest = remainder;
        }

        Self { fields, name }
    }
}
