//! Programmatic configuration for a [`crate::BusAttachment`].
//!
//! There is no config file or environment-variable surface here — this is
//! an embedded library linked into firmware, not a service with its own
//! deployment story, so every knob is a plain field set by the caller
//! before the attachment is built.

/// How many times [`ajbus_nsc::discover`]'s WHO-HAS/IS-AT round repeats
/// within one overall discovery deadline before giving up, mirroring the
/// original's `AJ_NS_WHO_HAS_REPEAT`.
pub const WHO_HAS_REPEAT: u32 = 4;

/// Per-attempt receive timeout, in milliseconds, for one WHO-HAS round.
pub const RX_TIMEOUT_MS: u32 = 1000;

/// Tuning knobs for a [`crate::BusAttachment`]: buffer sizes, the NVRAM
/// region size, and discovery timing. Built with plain `with_*` setters
/// rather than a derive macro — there's no CLI or file format to parse
/// values out of here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    rx_buffer_size: usize,
    tx_buffer_size: usize,
    nvram_region_size: usize,
    discovery_timeout_ms: u32,
    who_has_repeat: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            rx_buffer_size: 640,
            tx_buffer_size: 640,
            nvram_region_size: 4096,
            discovery_timeout_ms: RX_TIMEOUT_MS * WHO_HAS_REPEAT,
            who_has_repeat: WHO_HAS_REPEAT,
        }
    }
}

impl BusConfig {
    /// Sets the RX [`ajbus_wire::IoBuf`] capacity, builder-style.
    #[must_use]
    pub fn with_rx_buffer_size(mut self, v: usize) -> Self {
        self.rx_buffer_size = v;
        self
    }

    /// Sets the TX [`ajbus_wire::IoBuf`] capacity, builder-style.
    #[must_use]
    pub fn with_tx_buffer_size(mut self, v: usize) -> Self {
        self.tx_buffer_size = v;
        self
    }

    /// Sets the backing [`ajbus_nvram::NvStore`] region size in bytes,
    /// builder-style.
    #[must_use]
    pub fn with_nvram_region_size(mut self, v: usize) -> Self {
        self.nvram_region_size = v;
        self
    }

    /// Sets the overall discovery deadline in milliseconds, builder-style.
    #[must_use]
    pub fn with_discovery_timeout_ms(mut self, v: u32) -> Self {
        self.discovery_timeout_ms = v;
        self
    }

    /// Sets how many WHO-HAS rounds fit within the discovery deadline,
    /// builder-style.
    #[must_use]
    pub fn with_who_has_repeat(mut self, v: u32) -> Self {
        self.who_has_repeat = v;
        self
    }

    /// RX buffer capacity in bytes.
    #[must_use]
    pub fn rx_buffer_size(&self) -> usize {
        self.rx_buffer_size
    }

    /// TX buffer capacity in bytes.
    #[must_use]
    pub fn tx_buffer_size(&self) -> usize {
        self.tx_buffer_size
    }

    /// NVRAM backing region size in bytes.
    #[must_use]
    pub fn nvram_region_size(&self) -> usize {
        self.nvram_region_size
    }

    /// Overall discovery deadline in milliseconds.
    #[must_use]
    pub fn discovery_timeout_ms(&self) -> u32 {
        self.discovery_timeout_ms
    }

    /// How many WHO-HAS rounds fit within the discovery deadline.
    #[must_use]
    pub fn who_has_repeat(&self) -> u32 {
        self.who_has_repeat
    }
}
