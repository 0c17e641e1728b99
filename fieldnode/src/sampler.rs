//! Analog sources and the sampling engine.

use std::f64::consts::PI;
use std::path::{Path, PathBuf};

use fieldnode_common::{MAX_CHANNELS, SampleSet};

use crate::config::{ChannelBinding, SamplingConfig, SourceConfig};
use crate::error::{NodeError, Result};

/// Largest raw value of a 12-bit converter.
pub const ADC_MAX: u16 = 4095;

/// Something that returns one raw reading per analog input.
pub trait AnalogSource {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Take one instantaneous reading of an input.
    fn read(&mut self, input: u16) -> Result<u16>;
}

/// Linux IIO converter read through sysfs (`in_voltage<N>_raw`).
#[derive(Debug, Clone)]
pub struct SysfsAdc {
    device: PathBuf,
}

impl SysfsAdc {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }

    /// IIO device directory.
    pub fn device(&self) -> &Path {
        &self.device
    }
}

impl AnalogSource for SysfsAdc {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn read(&mut self, input: u16) -> Result<u16> {
        let path = self.device.join(format!("in_voltage{}_raw", input));
        let text = std::fs::read_to_string(&path)
            .map_err(|e| NodeError::sampling(input, format!("{}: {}", path.display(), e)))?;

        text.trim()
            .parse()
            .map_err(|e| NodeError::sampling(input, format!("'{}': {}", text.trim(), e)))
    }
}

/// Slowly varying waveform, one phase per input.
///
/// Deterministic: the same sequence of reads always yields the same values.
#[derive(Debug, Clone, Default)]
pub struct SimulatedAdc {
    reads: u64,
}

impl SimulatedAdc {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnalogSource for SimulatedAdc {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn read(&mut self, input: u16) -> Result<u16> {
        let mid = f64::from(ADC_MAX) / 2.0;
        let phase = self.reads as f64 * 0.02 + f64::from(input) * PI / 4.0;
        self.reads += 1;

        let value = mid + mid * 0.4 * phase.sin();
        Ok(value.round().clamp(0.0, f64::from(ADC_MAX)) as u16)
    }
}

/// Either source, chosen by configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredSource {
    Sysfs(SysfsAdc),
    Simulated(SimulatedAdc),
}

impl ConfiguredSource {
    pub fn from_config(config: &SourceConfig) -> Self {
        match config {
            SourceConfig::Sysfs { device } => Self::Sysfs(SysfsAdc::new(device.clone())),
            SourceConfig::Simulated => Self::Simulated(SimulatedAdc::new()),
        }
    }
}

impl AnalogSource for ConfiguredSource {
    fn name(&self) -> &'static str {
        match self {
            Self::Sysfs(adc) => adc.name(),
            Self::Simulated(adc) => adc.name(),
        }
    }

    fn read(&mut self, input: u16) -> Result<u16> {
        match self {
            Self::Sysfs(adc) => adc.read(input),
            Self::Simulated(adc) => adc.read(input),
        }
    }
}

/// Reads configured channels into a fixed-capacity sample set.
///
/// No averaging or filtering: every channel is one instantaneous read
/// passed through its binding's linear transform.
#[derive(Debug)]
pub struct Sampler<S: AnalogSource> {
    source: S,
    bindings: [ChannelBinding; MAX_CHANNELS],
    samples: SampleSet,
}

impl<S: AnalogSource> Sampler<S> {
    /// Create a sampler with one binding per possible channel.
    pub fn new(source: S, bindings: [ChannelBinding; MAX_CHANNELS]) -> Self {
        Self {
            source,
            bindings,
            samples: SampleSet::new(),
        }
    }

    /// Create a sampler from the `sampling` configuration section.
    pub fn from_config(source: S, config: &SamplingConfig) -> Self {
        Self::new(source, config.resolve())
    }

    /// Binding of a zero-based channel.
    pub fn binding(&self, index: usize) -> Option<&ChannelBinding> {
        self.bindings.get(index)
    }

    /// Analog source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Sample `channel_count` channels.
    ///
    /// Counts above [`MAX_CHANNELS`] are clamped so the buffer is never
    /// overrun. A failed read aborts the whole cycle; the previous
    /// contents are discarded either way.
    pub fn sample(&mut self, channel_count: usize) -> Result<SampleSet> {
        self.samples.clear();

        for binding in self.bindings.iter().take(channel_count.min(MAX_CHANNELS)) {
            let raw = self.source.read(binding.input)?;
            self.samples.push(binding.convert(raw));
        }

        Ok(self.samples)
    }
}
