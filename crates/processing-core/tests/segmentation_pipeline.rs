use shotscope_common::config::AppConfig;
use shotscope_ingest::{practice_session, Ingestor, LineOutcome, TraceBuilder};
use shotscope_model::sample::RawSample;
use shotscope_model::segment::{ShotLabel, ShotSegment};
use shotscope_processing::{
    LabelOutcome, Labeler, Processor, SegmenterEvent, Segmenter, SharedRingBuffer,
};

/// The processing stages wired the way the live pipeline wires them.
struct Stages {
    ingestor: Ingestor,
    processor: Processor,
    ring: SharedRingBuffer,
    segmenter: Segmenter,
    labeler: Labeler,
    shots: Vec<ShotSegment>,
    unmatched: usize,
}

impl Stages {
    fn new() -> Self {
        let config = AppConfig::default();
        Self {
            ingestor: Ingestor::new(),
            processor: Processor::new(&config.sensor, &config.filter),
            ring: SharedRingBuffer::new(config.sensor.buffer_capacity()),
            segmenter: Segmenter::new(config.segmenter.clone()),
            labeler: Labeler::new(config.labeler.clone()).expect("default labeler config is valid"),
            shots: Vec::new(),
            unmatched: 0,
        }
    }

    fn feed(&mut self, raw: &RawSample) {
        let LineOutcome::Sample(ingested) = self.ingestor.ingest_line(&raw.to_line(), 0) else {
            panic!("synthetic line should parse");
        };
        if let Some(result) = self.processor.feed_calibration(&ingested.raw, ingested.t_ms) {
            result.expect("calibration should succeed");
            self.segmenter.reset();
        }
        let sample = self
            .processor
            .process(&ingested.raw, ingested.t_ms, ingested.t_received_ns);
        self.ring.push(sample.clone());

        if !self.processor.is_calibrating() {
            if let Some(SegmenterEvent::Closed(seg)) = self.segmenter.feed(&sample) {
                self.labeler.segment_closed(&seg);
                self.shots.push(seg);
            }
        }
        match self.labeler.feed(sample.button, sample.t_ms) {
            Some(LabelOutcome::Assigned { shot_id, label, .. }) => {
                if let Some(shot) = self.shots.iter_mut().find(|s| s.shot_id == shot_id) {
                    shot.label = label;
                }
            }
            Some(LabelOutcome::Unmatched { .. }) => self.unmatched += 1,
            None => {}
        }
    }
}

#[test]
fn practice_session_yields_one_labeled_shot_per_swing() {
    let mut stages = Stages::new();
    for raw in practice_session(3) {
        stages.feed(&raw);
    }

    assert_eq!(stages.shots.len(), 3);
    assert_eq!(stages.unmatched, 0);
    for shot in &stages.shots {
        assert_eq!(shot.label, ShotLabel::Good);
        let duration = shot.duration_ms().expect("closed shot has an end");
        assert!(
            (300..=650).contains(&duration),
            "unexpected shot duration {duration}"
        );
        let features = shot.features.expect("closed shot has features");
        assert!(features.g1_peak > features.g2_peak);
        assert!(shot.sample_count > 0);
    }
    assert!(stages.shots.windows(2).all(|w| w[0].t_start < w[1].t_start));
}

#[test]
fn ring_buffer_holds_shot_window() {
    let mut stages = Stages::new();
    for raw in practice_session(1) {
        stages.feed(&raw);
    }
    let shot = &stages.shots[0];
    let end = shot.t_end.expect("closed");
    let window = stages.ring.range(shot.t_start, end);
    assert_eq!(window.len(), shot.sample_count);
    assert!(window.iter().all(|s| s.t_ms >= shot.t_start && s.t_ms <= end));
}

#[test]
fn calibration_removes_gyro_bias_before_segmenting() {
    // 40 dps of bias on x: under the entry threshold alone, but it would
    // inflate every feature.
    let trace = TraceBuilder::new(100)
        .with_gyro_bias([5240, 0, 0])
        .still(4_000)
        .swing(600, 300.0)
        .still(1_500)
        .build();

    let mut stages = Stages::new();
    stages
        .processor
        .start_calibration(3_000)
        .expect("no calibration running");
    for raw in &trace {
        stages.feed(raw);
    }

    let offset = stages.processor.offset();
    assert!((offset.gyro[0][0] - 5240.0).abs() < 2.0);
    assert_eq!(stages.shots.len(), 1);

    let last = stages.ring.latest().expect("buffer is not empty");
    assert!(last.primary().gyro_mag_raw < 1.0);
}

#[test]
fn quiet_trace_with_link_loss_yields_nothing() {
    let trace = TraceBuilder::new(100)
        .still(1_000)
        .skip(20)
        .still(1_000)
        .build();
    let mut stages = Stages::new();
    for raw in &trace {
        stages.feed(raw);
    }
    assert!(stages.shots.is_empty());
    assert_eq!(stages.ingestor.stats().dropped, 20);
}
