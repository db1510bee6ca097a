//! Effects Graph
//!
//! The processing topology is fixed:
//!
//! ```text
//! source -> lowpass -> highpass -> delay (+0.3 feedback) -+-> dry gain -+-> master gain -> destination
//!                                                          +-> convolver -> wet gain -+
//! ```
//!
//! A graph is first described as a list of [`StageDescriptor`]s from one
//! parameter snapshot, then instantiated into running stages. Live playback
//! and offline rendering drive the very same interpreter, one render quantum
//! at a time, so the two paths cannot drift apart.

use std::fmt;
use std::sync::Arc;

use log::debug;
use rand::Rng;
use uuid::Uuid;

use crate::dsp::biquad::{Biquad, FilterKind};
use crate::dsp::convolver::Convolver;
use crate::dsp::delay::{FeedbackDelay, FEEDBACK_GAIN};
use crate::dsp::impulse;
use crate::dsp::source::BufferSource;
use crate::dsp::RENDER_QUANTUM;
use crate::engine::AudioBuffer;
use crate::error::{AuroraError, Result};
use crate::params::ParameterSet;

/// Where a graph's output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Real-time output device
    LiveOutput,
    /// In-memory buffer for export
    OfflineCapture,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::LiveOutput => write!(f, "live"),
            Destination::OfflineCapture => write!(f, "offline"),
        }
    }
}

/// One node of the graph, in signal order
#[derive(Debug, Clone, PartialEq)]
pub enum StageDescriptor {
    Filter { kind: FilterKind, cutoff: f32 },
    Delay { time_secs: f32, feedback: f32 },
    /// Feeds the wet bus; the main bus passes through untouched
    Convolution { impulse: Arc<AudioBuffer> },
    /// Sums `main * dry_gain + wet * wet_gain` back into the main bus
    Mix { dry_gain: f32, wet_gain: f32 },
    Gain { value: f32 },
}

impl StageDescriptor {
    pub fn name(&self) -> &'static str {
        match self {
            StageDescriptor::Filter { kind, .. } => kind.name(),
            StageDescriptor::Delay { .. } => "delay",
            StageDescriptor::Convolution { .. } => "convolution",
            StageDescriptor::Mix { .. } => "mix",
            StageDescriptor::Gain { .. } => "gain",
        }
    }
}

impl fmt::Display for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageDescriptor::Filter { kind, cutoff } => write!(f, "{} {:.0} Hz", kind.name(), cutoff),
            StageDescriptor::Delay {
                time_secs,
                feedback,
            } => write!(f, "delay {:.2}s feedback {:.2}", time_secs, feedback),
            StageDescriptor::Convolution { impulse } => write!(
                f,
                "convolution {} frames x {} ch",
                impulse.num_samples(),
                impulse.num_channels()
            ),
            StageDescriptor::Mix { dry_gain, wet_gain } => {
                write!(f, "mix dry {:.2} wet {:.2}", dry_gain, wet_gain)
            }
            StageDescriptor::Gain { value } => write!(f, "gain {:.2}", value),
        }
    }
}

/// Declarative description of one graph instance
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSpec {
    pub sample_rate: u32,
    pub channels: usize,
    /// Source playback rate (pitch)
    pub playback_rate: f32,
    pub stages: Vec<StageDescriptor>,
}

impl GraphSpec {
    /// Describe the graph for a parameter snapshot
    ///
    /// A fresh reverb impulse is drawn from `rng` on every call.
    pub fn describe<R: Rng + ?Sized>(
        params: &ParameterSet,
        sample_rate: u32,
        channels: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AuroraError::InvalidGraph {
                reason: "sample rate must be positive".to_string(),
            });
        }
        if channels < 1 {
            return Err(AuroraError::InvalidGraph {
                reason: "channel count must be at least 1".to_string(),
            });
        }

        let params = params.clamped();
        let impulse = impulse::reverb_impulse(sample_rate, channels, rng)?;

        let stages = vec![
            StageDescriptor::Filter {
                kind: FilterKind::Lowpass,
                cutoff: params.lowpass_cutoff,
            },
            StageDescriptor::Filter {
                kind: FilterKind::Highpass,
                cutoff: params.highpass_cutoff,
            },
            StageDescriptor::Delay {
                time_secs: params.delay_time,
                feedback: FEEDBACK_GAIN,
            },
            StageDescriptor::Convolution {
                impulse: Arc::new(impulse),
            },
            StageDescriptor::Mix {
                dry_gain: params.dry_gain(),
                wet_gain: params.wet_gain(),
            },
            StageDescriptor::Gain {
                value: params.master_gain(),
            },
        ];

        Ok(Self {
            sample_rate,
            channels,
            playback_rate: params.pitch,
            stages,
        })
    }
}

/// Running state of one stage
enum Stage {
    Filter(Biquad),
    Delay(FeedbackDelay),
    /// `None` when the wet bus is muted, which leaves it silent
    Convolution(Option<Box<Convolver>>),
    Mix { dry_gain: f32, wet_gain: f32 },
    Gain(f32),
}

impl Stage {
    fn instantiate(descriptor: &StageDescriptor, spec: &GraphSpec, wet_muted: bool) -> Self {
        match descriptor {
            StageDescriptor::Filter { kind, cutoff } => {
                Stage::Filter(Biquad::new(*kind, *cutoff, spec.sample_rate, spec.channels))
            }
            StageDescriptor::Delay {
                time_secs,
                feedback,
            } => Stage::Delay(FeedbackDelay::new(
                *time_secs,
                *feedback,
                spec.sample_rate,
                spec.channels,
            )),
            StageDescriptor::Convolution { impulse } => {
                if wet_muted {
                    Stage::Convolution(None)
                } else {
                    Stage::Convolution(Some(Box::new(Convolver::new(
                        impulse,
                        spec.channels,
                        RENDER_QUANTUM,
                        true,
                    ))))
                }
            }
            StageDescriptor::Mix { dry_gain, wet_gain } => Stage::Mix {
                dry_gain: *dry_gain,
                wet_gain: *wet_gain,
            },
            StageDescriptor::Gain { value } => Stage::Gain(*value),
        }
    }
}

/// Run one quantum through `stages`
///
/// `main` carries the signal; `wet` is the reverb send bus.
fn run_stages(stages: &mut [Stage], main: &mut [Vec<f32>], wet: &mut [Vec<f32>]) {
    for stage in stages.iter_mut() {
        match stage {
            Stage::Filter(filter) => filter.process(main),
            Stage::Delay(delay) => delay.process(main),
            Stage::Convolution(Some(convolver)) => convolver.process(main, wet),
            Stage::Convolution(None) => {
                for channel in wet.iter_mut() {
                    channel.fill(0.0);
                }
            }
            Stage::Mix { dry_gain, wet_gain } => {
                for (m, w) in main.iter_mut().zip(wet.iter()) {
                    for (x, &y) in m.iter_mut().zip(w) {
                        *x = *x * *dry_gain + y * *wet_gain;
                    }
                }
            }
            Stage::Gain(value) => {
                for channel in main.iter_mut() {
                    for x in channel.iter_mut() {
                        *x *= *value;
                    }
                }
            }
        }
    }
}

/// A wired graph bound to one destination, used for one playback or render
pub struct EffectsGraph {
    id: Uuid,
    destination: Destination,
    spec: GraphSpec,
    stages: Vec<Stage>,
    source: Option<BufferSource>,
    main: Vec<Vec<f32>>,
    wet: Vec<Vec<f32>>,
    frames_rendered: u64,
}

impl fmt::Debug for EffectsGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectsGraph")
            .field("id", &self.id)
            .field("destination", &self.destination)
            .field("sample_rate", &self.spec.sample_rate)
            .field("channels", &self.spec.channels)
            .field("frames_rendered", &self.frames_rendered)
            .finish()
    }
}

impl EffectsGraph {
    /// Describe and instantiate a graph in one step
    pub fn build<R: Rng + ?Sized>(
        params: &ParameterSet,
        sample_rate: u32,
        channels: usize,
        destination: Destination,
        rng: &mut R,
    ) -> Result<Self> {
        let spec = GraphSpec::describe(params, sample_rate, channels, rng)?;
        Ok(Self::from_spec(spec, destination))
    }

    /// Instantiate a described graph
    pub fn from_spec(spec: GraphSpec, destination: Destination) -> Self {
        let wet_muted = spec.stages.iter().any(|stage| {
            matches!(stage, StageDescriptor::Mix { wet_gain, .. } if *wet_gain == 0.0)
        });
        let stages = spec
            .stages
            .iter()
            .map(|descriptor| Stage::instantiate(descriptor, &spec, wet_muted))
            .collect();

        let id = Uuid::new_v4();
        debug!(
            "Built {} graph {} ({} Hz, {} ch): {}",
            destination,
            id,
            spec.sample_rate,
            spec.channels,
            spec.stages
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        Self {
            id,
            destination,
            main: vec![vec![0.0; RENDER_QUANTUM]; spec.channels],
            wet: vec![vec![0.0; RENDER_QUANTUM]; spec.channels],
            spec,
            stages,
            source: None,
            frames_rendered: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn destination(&self) -> Destination {
        self.destination
    }

    pub fn spec(&self) -> &GraphSpec {
        &self.spec
    }

    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.spec.channels
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Connect a recording to the head of the graph, starting at offset 0
    pub fn start(&mut self, buffer: Arc<AudioBuffer>) {
        self.source = Some(BufferSource::new(
            buffer,
            self.spec.playback_rate,
            self.spec.sample_rate,
        ));
    }

    /// Whether the source has played out (tails may still be ringing)
    pub fn source_finished(&self) -> bool {
        self.source.as_ref().map_or(true, |s| s.is_finished())
    }

    /// Render the next quantum and return it, one slice per channel
    pub fn render_quantum(&mut self) -> &[Vec<f32>] {
        match self.source.as_mut() {
            Some(source) => {
                source.fill(&mut self.main);
            }
            None => {
                for channel in self.main.iter_mut() {
                    channel.fill(0.0);
                }
            }
        }

        run_stages(&mut self.stages, &mut self.main, &mut self.wet);
        self.frames_rendered += RENDER_QUANTUM as u64;
        &self.main
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamId;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn dry_params() -> ParameterSet {
        let mut params = ParameterSet::default();
        params.set(ParamId::Gain, 100.0);
        params
    }

    #[test]
    fn test_describe_topology() {
        let mut rng = StdRng::seed_from_u64(1);
        let spec = GraphSpec::describe(&ParameterSet::default(), 8000, 2, &mut rng).unwrap();
        let names: Vec<_> = spec.stages.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec!["lowpass", "highpass", "delay", "convolution", "mix", "gain"]
        );

        match &spec.stages[3] {
            StageDescriptor::Convolution { impulse } => {
                assert_eq!(impulse.num_samples(), 20000);
                assert_eq!(impulse.num_channels(), 2);
            }
            other => panic!("unexpected stage {:?}", other),
        }
        assert_eq!(spec.stages[5], StageDescriptor::Gain { value: 0.5 });
    }

    #[test]
    fn test_describe_rejects_bad_config() {
        let mut rng = StdRng::seed_from_u64(1);
        let params = ParameterSet::default();
        assert!(matches!(
            GraphSpec::describe(&params, 0, 2, &mut rng),
            Err(AuroraError::InvalidGraph { .. })
        ));
        assert!(matches!(
            GraphSpec::describe(&params, 8000, 0, &mut rng),
            Err(AuroraError::InvalidGraph { .. })
        ));
    }

    #[test]
    fn test_silence_in_silence_out() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut params = dry_params();
        params.set(ParamId::ReverbMix, 0.5);
        params.set(ParamId::DelayTime, 0.1);
        let mut graph =
            EffectsGraph::build(&params, 8000, 1, Destination::OfflineCapture, &mut rng).unwrap();
        for _ in 0..10 {
            assert!(graph.render_quantum()[0].iter().all(|&s| s == 0.0));
        }
        assert_eq!(graph.frames_rendered(), 10 * RENDER_QUANTUM as u64);
    }

    #[test]
    fn test_neutral_settings_delay_by_one_quantum() {
        // Default filters are transparent at 8 kHz, mix is fully dry and the
        // minimum loop delay shifts the signal by one quantum
        let mut rng = StdRng::seed_from_u64(3);
        let mut graph =
            EffectsGraph::build(&dry_params(), 8000, 1, Destination::OfflineCapture, &mut rng)
                .unwrap();

        let mut input = vec![0.0; RENDER_QUANTUM];
        input[5] = 1.0;
        let buffer = Arc::new(AudioBuffer::from_channels(vec![input], 8000).unwrap());
        graph.start(buffer);

        let first = graph.render_quantum()[0].clone();
        assert!(first.iter().all(|&s| s == 0.0));
        let second = graph.render_quantum()[0].clone();
        assert!(second[5] > 0.9, "got {}", second[5]);
    }

    #[test]
    fn test_master_gain_scales_output() {
        let buffer = Arc::new(AudioBuffer::sine_wave(440.0, 0.1, 8000, 1));

        let mut loud = EffectsGraph::build(
            &dry_params(),
            8000,
            1,
            Destination::OfflineCapture,
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();
        let mut params = dry_params();
        params.set(ParamId::Gain, 25.0);
        let mut quiet = EffectsGraph::build(
            &params,
            8000,
            1,
            Destination::OfflineCapture,
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();

        loud.start(buffer.clone());
        quiet.start(buffer);
        for _ in 0..4 {
            let a = loud.render_quantum()[0].clone();
            let b = quiet.render_quantum()[0].clone();
            for (x, y) in a.iter().zip(&b) {
                assert!((x * 0.25 - y).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_same_seed_same_output() {
        let mut params = dry_params();
        params.set(ParamId::ReverbMix, 1.0);
        let buffer = Arc::new(AudioBuffer::sine_wave(300.0, 0.05, 8000, 2));

        let render = |seed: u64| {
            let mut graph = EffectsGraph::build(
                &params,
                8000,
                2,
                Destination::OfflineCapture,
                &mut StdRng::seed_from_u64(seed),
            )
            .unwrap();
            graph.start(buffer.clone());
            (0..8)
                .flat_map(|_| graph.render_quantum().to_vec())
                .collect::<Vec<_>>()
        };

        assert_eq!(render(9), render(9));
        assert_ne!(render(9), render(10));
    }

    #[test]
    fn test_wet_path_produces_tail() {
        let mut params = dry_params();
        params.set(ParamId::ReverbMix, 1.0);
        let mut graph = EffectsGraph::build(
            &params,
            8000,
            1,
            Destination::LiveOutput,
            &mut StdRng::seed_from_u64(5),
        )
        .unwrap();
        graph.start(Arc::new(AudioBuffer::sine_wave(200.0, 0.05, 8000, 1)));

        // Source is 400 frames; well after it ends the reverb still rings
        for _ in 0..10 {
            graph.render_quantum();
        }
        assert!(graph.source_finished());
        let tail = graph.render_quantum()[0].clone();
        assert!(tail.iter().any(|&s| s.abs() > 1e-6));
        assert!(tail.iter().all(|s| s.is_finite()));
    }
}
