/// How events arriving after the reorder window are handled.
///
/// Every variant carries the reorder latency: the number of ticks behind the
/// latest observed sync time within which events are accepted and reordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisorderPolicy {
    /// Late events fail the query.
    Throw { reorder_latency: i64 },
    /// Late events are discarded.
    Drop { reorder_latency: i64 },
    /// Late events are moved up to the earliest acceptable time.
    Adjust { reorder_latency: i64 },
}

impl Default for DisorderPolicy {
    fn default() -> Self {
        DisorderPolicy::Throw { reorder_latency: 0 }
    }
}

impl DisorderPolicy {
    pub fn reorder_latency(&self) -> i64 {
        match self {
            DisorderPolicy::Throw { reorder_latency }
            | DisorderPolicy::Drop { reorder_latency }
            | DisorderPolicy::Adjust { reorder_latency } => (*reorder_latency).max(0),
        }
    }
}

/// When a partially filled output batch is sealed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Only when full, on an explicit flush, or on completion.
    None,
    /// After every punctuation or low watermark, which is then the last row
    /// of its batch.
    #[default]
    FlushOnPunctuation,
    /// After every low watermark.
    FlushOnLowWatermark,
    /// At the end of each bulk ingress call.
    FlushOnBatchBoundary,
}

/// Generation of punctuations at period boundaries crossed by data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodicPunctuationPolicy {
    #[default]
    None,
    Time { period: i64 },
}

/// Generation of low watermarks at period boundaries crossed by data.
///
/// Only valid on partitioned streams. The emitted value is the boundary minus
/// the lag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodicLowWatermarkPolicy {
    #[default]
    None,
    Time { period: i64, lag: i64 },
}

/// What happens when the source completes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnCompletedPolicy {
    /// Seal the output. Events still in the reorder window are not released.
    None,
    /// Release every buffered event and seal the output.
    Flush,
    /// Release every buffered event, then emit a final punctuation (or low
    /// watermark for partitioned streams) at infinity.
    #[default]
    EndOfStream,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct IngressOptions {
    pub disorder: DisorderPolicy,
    pub flush: FlushPolicy,
    pub punctuation: PeriodicPunctuationPolicy,
    pub low_watermark: PeriodicLowWatermarkPolicy,
    pub on_completed: OnCompletedPolicy,
}

impl IngressOptions {
    pub fn with_disorder(mut self, disorder: DisorderPolicy) -> Self {
        self.disorder = disorder;
        self
    }

    pub fn with_flush(mut self, flush: FlushPolicy) -> Self {
        self.flush = flush;
        self
    }

    pub fn with_punctuation(mut self, punctuation: PeriodicPunctuationPolicy) -> Self {
        self.punctuation = punctuation;
        self
    }

    pub fn with_low_watermark(mut self, low_watermark: PeriodicLowWatermarkPolicy) -> Self {
        self.low_watermark = low_watermark;
        self
    }

    pub fn with_on_completed(mut self, on_completed: OnCompletedPolicy) -> Self {
        self.on_completed = on_completed;
        self
    }

    pub(crate) fn validate(&self, partitioned: bool) -> Result<(), &'static str> {
        if let PeriodicPunctuationPolicy::Time { period } = self.punctuation {
            if period <= 0 {
                return Err("punctuation period must be positive");
            }
        }
        if let PeriodicLowWatermarkPolicy::Time { period, lag } = self.low_watermark {
            if !partitioned {
                return Err("low watermarks require a partitioned stream");
            }
            if period <= 0 {
                return Err("low watermark period must be positive");
            }
            if lag < 0 {
                return Err("low watermark lag must not be negative");
            }
        }
        Ok(())
    }
}
