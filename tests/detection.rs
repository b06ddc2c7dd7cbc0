//! End-to-end detection runs over synthetic frame sequences

use scenecut::{
    ContentConfig, ContentDetector, Detector, Frame, FrameMetricStore, SceneManager,
    ThresholdConfig, ThresholdDetector,
};

const FPS: f64 = 30.0;

fn gray(value: u8) -> Frame {
    Frame::filled(16, 12, [value, value, value])
}

fn run(detectors: Vec<Detector>, frames: &[Frame]) -> SceneManager {
    let mut manager = SceneManager::new(FPS).unwrap();
    for detector in detectors {
        manager.add_detector(detector);
    }
    manager.process_frames(frames).unwrap();
    manager.finish().unwrap();
    manager
}

/// Deterministic sequence of flat frames whose brightness jumps at irregular
/// intervals, dipping to black now and then.
fn busy_sequence(len: usize) -> Vec<Frame> {
    let mut state: u32 = 12345;
    let mut next = move || {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (state >> 16) & 0x7fff
    };

    let mut frames = Vec::with_capacity(len);
    let mut value = 128u8;
    while frames.len() < len {
        let run_len = 1 + (next() % 7) as usize;
        for _ in 0..run_len {
            frames.push(gray(value));
        }
        value = if next() % 4 == 0 { 0 } else { 40 + (next() % 200) as u8 };
    }
    frames.truncate(len);
    frames
}

#[test]
fn test_fade_through_black() {
    let frames: Vec<Frame> = (0..90)
        .map(|i| if (30..60).contains(&i) { gray(0) } else { gray(200) })
        .collect();
    let config = ThresholdConfig::default()
        .threshold(12)
        .min_percent(0.95)
        .min_scene_len(15)
        .fade_bias(0.0);
    let manager = run(vec![ThresholdDetector::new(config).unwrap().into()], &frames);

    assert_eq!(manager.cut_list(), &[45]);

    let scenes = manager.scene_list(1).unwrap();
    assert_eq!(scenes.len(), 2);
    assert_eq!((scenes[0].start_frame(), scenes[0].end_frame()), (0, 44));
    assert_eq!((scenes[1].start_frame(), scenes[1].end_frame()), (45, 89));
    assert_eq!(scenes[1].start_timecode().to_string(), "00:00:01.500");
    assert_eq!(scenes[1].end_timecode().to_string(), "00:00:03.000");
}

#[test]
fn test_single_content_spike() {
    // Deltas of a third of a level everywhere except one jump of 240 levels
    // (score 80) at frame 50
    let frames: Vec<Frame> = (0..100)
        .map(|i| match i {
            0..=48 => gray(10 + (i % 2) as u8),
            49 => gray(10),
            _ => gray(250),
        })
        .collect();
    let config = ContentConfig::default().threshold(30.0).min_scene_len(15);
    let manager = run(vec![ContentDetector::new(config).unwrap().into()], &frames);

    assert_eq!(manager.cut_list(), &[50]);
    assert_eq!(manager.metrics().get(50, "delta_hsv_avg"), Some(80.0));
    assert_eq!(manager.metrics().get(50, "delta_lum"), Some(240.0));
}

#[test]
fn test_cuts_five_frames_apart() {
    let frames: Vec<Frame> = (0..90)
        .map(|i| if (40..45).contains(&i) { gray(255) } else { gray(0) })
        .collect();
    let config = ContentConfig::default().min_scene_len(15);
    let manager = run(vec![ContentDetector::new(config).unwrap().into()], &frames);

    assert_eq!(manager.cut_list(), &[40]);
}

#[test]
fn test_repeated_runs_are_identical() {
    let frames = busy_sequence(300);
    let detectors = || -> Vec<Detector> {
        vec![
            ThresholdDetector::default().into(),
            ContentDetector::default().into(),
        ]
    };

    let first = run(detectors(), &frames);
    let second = run(detectors(), &frames);
    assert!(!first.cut_list().is_empty());
    assert_eq!(first.cut_list(), second.cut_list());
}

#[test]
fn test_cuts_respect_min_scene_len() {
    let frames = busy_sequence(400);
    for min_scene_len in [1, 4, 15, 40] {
        let content = ContentConfig::default().min_scene_len(min_scene_len);
        let threshold = ThresholdConfig::default()
            .min_scene_len(min_scene_len)
            .add_final_scene(true);
        let detectors: [Detector; 2] = [
            ContentDetector::new(content).unwrap().into(),
            ThresholdDetector::new(threshold).unwrap().into(),
        ];

        for detector in detectors {
            let name = detector.name();
            let manager = run(vec![detector], &frames);
            for pair in manager.cut_list().windows(2) {
                assert!(
                    pair[1] - pair[0] >= min_scene_len,
                    "{} detector emitted {:?} with min_scene_len {}",
                    name,
                    pair,
                    min_scene_len
                );
            }
        }
    }
}

#[test]
fn test_scenes_partition_stream() {
    for len in [1, 2, 17, 250] {
        let frames = busy_sequence(len);
        let manager = run(
            vec![
                ContentDetector::new(ContentConfig::default().min_scene_len(1))
                    .unwrap()
                    .into(),
                ThresholdDetector::default().into(),
            ],
            &frames,
        );

        for min_scene_len in [1, 5, 30] {
            let scenes = manager.scene_list(min_scene_len).unwrap();
            assert_eq!(scenes[0].start_frame(), 0);
            assert_eq!(scenes.last().unwrap().end_frame(), len as u64 - 1);
            for pair in scenes.windows(2) {
                assert_eq!(pair[0].end_frame() + 1, pair[1].start_frame());
                assert_eq!(pair[0].end_timecode(), pair[1].start_timecode());
            }
            let total: u64 = scenes.iter().map(|scene| scene.duration_frames()).sum();
            assert_eq!(total, len as u64);
        }
    }
}

#[test]
fn test_chained_detectors_share_cut_list() {
    // A hard cut at 20 and a fade through black from 50 to 70
    let frames: Vec<Frame> = (0..100)
        .map(|i| match i {
            0..=19 => gray(60),
            50..=69 => gray(0),
            _ => gray(220),
        })
        .collect();
    let content = ContentConfig::default().min_scene_len(10);
    let threshold = ThresholdConfig::default().min_scene_len(10);
    let manager = run(
        vec![
            ContentDetector::new(content).unwrap().into(),
            ThresholdDetector::new(threshold).unwrap().into(),
        ],
        &frames,
    );

    // The content detector also sees the edges of the fade at 50 and 70;
    // the threshold detector places its cut at 60 inside the list.
    assert_eq!(manager.cut_list(), &[20, 50, 60, 70]);
}

#[test]
fn test_chained_detectors_keep_min_scene_len() {
    // Same stream as above: the fade split at 60 sits only 10 frames from the
    // content cuts at 50 and 70, so it is dropped.
    let frames: Vec<Frame> = (0..100)
        .map(|i| match i {
            0..=19 => gray(60),
            50..=69 => gray(0),
            _ => gray(220),
        })
        .collect();
    let content = ContentConfig::default().min_scene_len(15);
    let threshold = ThresholdConfig::default().min_scene_len(15);
    let manager = run(
        vec![
            ContentDetector::new(content).unwrap().into(),
            ThresholdDetector::new(threshold).unwrap().into(),
        ],
        &frames,
    );

    assert_eq!(manager.cut_list(), &[20, 50, 70]);
}

#[test]
fn test_chained_cuts_respect_min_scene_len() {
    let frames = busy_sequence(400);
    for min_scene_len in [4, 15, 40] {
        let content = ContentConfig::default().min_scene_len(min_scene_len);
        let threshold = ThresholdConfig::default()
            .min_scene_len(min_scene_len)
            .add_final_scene(true);
        let manager = run(
            vec![
                ThresholdDetector::new(threshold).unwrap().into(),
                ContentDetector::new(content).unwrap().into(),
            ],
            &frames,
        );
        for pair in manager.cut_list().windows(2) {
            assert!(
                pair[1] - pair[0] >= min_scene_len,
                "chained detectors emitted {:?} with min_scene_len {}",
                pair,
                min_scene_len
            );
        }
    }
}

#[test]
fn test_stats_file_reload_skips_recomputation() {
    let frames = busy_sequence(120);
    let detectors = || -> Vec<Detector> {
        vec![
            ThresholdDetector::default().into(),
            ContentDetector::default().into(),
        ]
    };

    let first = run(detectors(), &frames);
    assert!(first.metrics().is_save_required());
    let first_cuts = first.cut_list().to_vec();

    let dir = tempfile::tempdir().unwrap();
    let stats_path = dir.path().join("stats.csv");
    let mut metrics = first.into_metrics();
    metrics.save_to_path(&stats_path, FPS).unwrap();
    let first_stats = std::fs::read_to_string(&stats_path).unwrap();

    let mut reloaded = FrameMetricStore::new();
    let rows = reloaded.load_from_path(&stats_path, FPS).unwrap();
    assert_eq!(rows, 120);
    assert!(!reloaded.is_save_required());

    let mut manager = SceneManager::new(FPS).unwrap().with_metrics(reloaded);
    for detector in detectors() {
        manager.add_detector(detector);
    }
    manager.process_frames(&frames).unwrap();
    manager.finish().unwrap();

    assert_eq!(manager.cut_list(), first_cuts.as_slice());
    assert!(!manager.metrics().is_save_required());

    let mut output = Vec::new();
    manager.into_metrics().save(&mut output, FPS).unwrap();
    assert_eq!(String::from_utf8(output).unwrap(), first_stats);
}

#[test]
fn test_stats_file_framerate_checked() {
    let frames = busy_sequence(10);
    let manager = run(vec![ThresholdDetector::default().into()], &frames);

    let mut output = Vec::new();
    manager.into_metrics().save(&mut output, 25.0).unwrap();

    let mut store = FrameMetricStore::new();
    assert!(store.load(output.as_slice(), 30.0).is_err());
}
