// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

// Dev note: This and related bits taken from `sp_runtime::generic::Era`

/// An era to describe the longevity of a transaction.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum Era {
    /// The transaction is valid forever. The genesis hash must be present in
    /// the signed content.
    #[default]
    Immortal,

    /// The transaction will expire after a window of blocks.
    Mortal {
        /// The number of blocks the transaction is valid for after the
        /// checkpoint block.
        period: u64,
        /// The phase in the period that this transaction's lifetime begins.
        phase: u64,
    },
}

impl Era {
    /// The number of bytes an era occupies on the wire: one if the first
    /// byte is `0x00` (immortal), two otherwise.
    pub fn encoded_len(first_byte: u8) -> usize {
        if first_byte == 0 { 1 } else { 2 }
    }
}

// Copied from `sp_runtime::generic::Era`; this is the wire interface and so
// it's really the most important bit here.
impl codec::Encode for Era {
    fn encode_to<T: codec::Output + ?Sized>(&self, output: &mut T) {
        match self {
            Self::Immortal => output.push_byte(0),
            Self::Mortal { period, phase } => {
                let quantize_factor = (*period >> 12).max(1);
                let encoded = (period.trailing_zeros() - 1).clamp(1, 15) as u16
                    | ((phase / quantize_factor) << 4) as u16;
                encoded.encode_to(output);
            }
        }
    }
}

impl codec::Decode for Era {
    fn decode<I: codec::Input>(input: &mut I) -> Result<Self, codec::Error> {
        let first = input.read_byte()?;
        if first == 0 {
            Ok(Self::Immortal)
        } else {
            let encoded = first as u64 + ((input.read_byte()? as u64) << 8);
            let period = 2 << (encoded % (1 << 4));
            let quantize_factor = (period >> 12).max(1);
            let phase = (encoded >> 4) * quantize_factor;
            if period >= 4 && phase < period {
                Ok(Self::Mortal { period, phase })
            } else {
                Err("Invalid period and phase".into())
            }
        }
    }
}
