// Deterministic random sources for the installation.
//
// Two generators live here:
//
// - `FieldRng`: xoshiro256++ (Blackman & Vigna, 2019) seeded through
//   SplitMix64. Every probabilistic decision in the workspace draws from an
//   instance of it: bpm jitter in the parameter mapper, the composer's note
//   and gate rolls, pink-noise excitation, reverb tap placement. Subsystems
//   take their own stream via `fork()` so adding draws in one place never
//   shifts another subsystem's sequence.
// - `Lcg31`: the 31-bit linear congruential generator that lays out the
//   particle cloud. Layouts must be identical on every platform and every
//   run, so its arithmetic is pinned down exactly (see `Lcg31::next_unit`).
//
// Neither generator reads OS entropy. A session that wants variety picks a
// seed from the wall clock at the binary's edge and passes it in.
//
// **Critical constraint: determinism.** Integer paths use only wrapping
// integer arithmetic; float conversions are exact bit manipulations. Do not
// swap either generator for a platform default.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ stream. The workspace's general-purpose randomness.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldRng {
    s: [u64; 4],
}

impl FieldRng {
    /// Seed a stream. Equal seeds yield equal sequences.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Derive an independent child stream tagged by `stream`.
    ///
    /// The parent advances by one draw, so forking the same parent twice with
    /// the same tag still yields two different children.
    pub fn fork(&mut self, stream: u64) -> FieldRng {
        let base = self.next_u64();
        FieldRng::new(base ^ stream.wrapping_mul(0xd1b5_4a32_d192_ed03))
    }

    pub fn next_u64(&mut self) -> u64 {
        let out = self.s[0]
            .wrapping_add(self.s[3])
            .rotate_left(23)
            .wrapping_add(self.s[0]);
        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        out
    }

    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform in [0, 1), 24 bits of mantissa.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform in [0, 1), 53 bits of mantissa.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in `[low, high)`. Panics if `low >= high`.
    pub fn range_f32(&mut self, low: f32, high: f32) -> f32 {
        assert!(low < high, "range_f32: empty range {low}..{high}");
        low + self.next_f32() * (high - low)
    }

    /// Uniform integer in `[low, high)`, rejection-sampled to avoid modulo
    /// bias. Panics if `low >= high`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        assert!(low < high, "range_usize: empty range {low}..{high}");
        let span = (high - low) as u64;
        if span.is_power_of_two() {
            return low + (self.next_u64() & (span - 1)) as usize;
        }
        let threshold = span.wrapping_neg() % span;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % span) as usize;
            }
        }
    }

    /// `true` with probability `p`. `p <= 0` never fires, `p >= 1` always does.
    pub fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Pick one element uniformly. `None` for an empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            None
        } else {
            items.get(self.range_usize(0, items.len()))
        }
    }
}

/// SplitMix64 step, used only to expand a `u64` seed into xoshiro state.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

// ---------------------------------------------------------------------------
// Particle layout generator
// ---------------------------------------------------------------------------

const LCG_MULTIPLIER: f64 = 1_103_515_245.0;
const LCG_INCREMENT: f64 = 12_345.0;
const LCG_MASK: u32 = 0x7fff_ffff;
const TWO_POW_32: f64 = 4_294_967_296.0;

/// 31-bit LCG used to scatter particles on their rest shell.
///
/// `seed' = (seed * 1103515245 + 12345) & 0x7fffffff`, where the product is
/// formed in f64. Products above 2^53 round, and that rounding is part of the
/// sequence: the canonical layouts were produced that way. IEEE multiply and
/// `rem_euclid` are exact operations, so the result is identical everywhere.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lcg31 {
    seed: u32,
}

impl Lcg31 {
    /// The seed every shipped particle layout starts from.
    pub const LAYOUT_SEED: u32 = 12_345;

    pub fn new(seed: u32) -> Self {
        Self {
            seed: seed & LCG_MASK,
        }
    }

    /// Advance and return the raw 31-bit state.
    pub fn next_raw(&mut self) -> u32 {
        let wide = f64::from(self.seed) * LCG_MULTIPLIER + LCG_INCREMENT;
        // Integer-valued and below 2^63, so the cast is exact.
        let low = wide.rem_euclid(TWO_POW_32) as u64;
        self.seed = (low as u32) & LCG_MASK;
        self.seed
    }

    /// Advance and return the state scaled to [0, 1].
    pub fn next_unit(&mut self) -> f64 {
        f64::from(self.next_raw()) / f64::from(LCG_MASK)
    }
}
