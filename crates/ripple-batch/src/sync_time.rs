/// Wrapper around the sync time of an event.
///
/// Sync times are opaque ticks. `INFINITY` is reserved for open-ended
/// intervals and for the final marker of a completed stream.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct SyncTime(i64);

impl std::fmt::Display for SyncTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::INFINITY => write!(f, "inf"),
            Self::MIN => write!(f, "-inf"),
            Self(ticks) => write!(f, "{ticks}"),
        }
    }
}

impl SyncTime {
    pub const ZERO: Self = Self(0);
    /// Lower bound of every sync time. Used as the initial marker.
    pub const MIN: Self = Self(i64::MIN);
    /// End time of a start edge, and the time of the final marker.
    pub const INFINITY: Self = Self(i64::MAX);
    /// The other time carried by punctuations and low watermarks.
    pub const PUNCTUATION_OTHER: Self = Self(i64::MIN);

    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    pub fn is_infinite(self) -> bool {
        self == Self::INFINITY
    }

    /// The next representable time.
    ///
    /// Saturates at `INFINITY`.
    pub fn succ(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Subtract a duration, saturating rather than wrapping near `MIN`.
    pub fn saturating_sub(self, ticks: i64) -> Self {
        if self.is_infinite() {
            return self;
        }
        Self(self.0.saturating_sub(ticks))
    }

    /// Round down to the nearest multiple of `period`.
    ///
    /// `INFINITY` and `MIN` are left unchanged.
    pub fn quantize(self, period: i64) -> Self {
        debug_assert!(period > 0, "period must be positive");
        if self == Self::INFINITY || self == Self::MIN || period <= 1 {
            return self;
        }
        Self(self.0 - self.0.rem_euclid(period))
    }
}

impl From<SyncTime> for i64 {
    fn from(val: SyncTime) -> Self {
        val.0
    }
}

impl From<i64> for SyncTime {
    fn from(value: i64) -> Self {
        SyncTime(value)
    }
}
