//! End-to-end detector behaviour with a scripted segmentation model.

#![allow(clippy::unwrap_used, clippy::float_cmp)]

use image::{GrayImage, Luma, Rgb, RgbImage};
use skywarden::config::{Config, LabelsConfig, SpeciesBackendKind, SpeciesConfig, Verbosity};
use skywarden::detector::{RawInstance, SegmentationDetector, SegmentationModel};
use skywarden::inference::{Device, DeviceHint, PlatformProbe, select_device_with};
use skywarden::labels::{LabelMap, LabelResolver, LabelSources};
use skywarden::species::{ClassificationBackend, ClassifierRegistry, try_build_backend};
use skywarden::vision::{ChannelOrder, Frame, InstanceMask};
use skywarden::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const FRAME_W: u32 = 640;
const FRAME_H: u32 = 480;
const BIRD: usize = 14;
const PERSON: usize = 0;

/// Segmentation model that replays a fixed set of instances.
struct ScriptedModel {
    names: Option<Vec<String>>,
    instances: Vec<RawInstance>,
    fail: bool,
}

impl ScriptedModel {
    fn new(instances: Vec<RawInstance>) -> Self {
        Self {
            names: Some(coco_names()),
            instances,
            fail: false,
        }
    }

    fn without_names(mut self) -> Self {
        self.names = None;
        self
    }
}

impl SegmentationModel for ScriptedModel {
    fn class_names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    fn infer(&mut self, _frame: &Frame, _confidence: f32, _nms: f32) -> Result<Vec<RawInstance>> {
        if self.fail {
            return Err(Error::Inference {
                reason: "scripted failure".to_string(),
            });
        }
        Ok(self.instances.clone())
    }
}

fn coco_names() -> Vec<String> {
    let mut names: Vec<String> = (0..BIRD).map(|i| format!("class{i}")).collect();
    names[PERSON] = "person".to_string();
    names.push("bird".to_string());
    names.push("cat".to_string());
    names
}

fn frame() -> Frame {
    Frame::new(
        RgbImage::from_pixel(FRAME_W, FRAME_H, Rgb([90, 120, 160])),
        ChannelOrder::Rgb,
    )
    .with_timestamp(1_700_000_000.25)
}

fn bird_mask() -> InstanceMask {
    let mut mask = GrayImage::new(40, 30);
    for y in 4..26 {
        for x in 6..34 {
            mask.put_pixel(x, y, Luma([255]));
        }
    }
    InstanceMask {
        origin: (100, 100),
        mask,
    }
}

fn bird(confidence: f32) -> RawInstance {
    RawInstance {
        bbox: [100.0, 100.0, 140.0, 130.0],
        confidence,
        class_id: BIRD,
        mask: Some(bird_mask()),
    }
}

fn config(species_threshold: f32) -> Config {
    Config {
        species: Some(SpeciesConfig {
            backend: SpeciesBackendKind::External,
            confidence_threshold: species_threshold,
            input_size: (64, 64),
            module: Some("hawks".to_string()),
            function: Some("top1".to_string()),
            ..SpeciesConfig::default()
        }),
        ..Config::default()
    }
}

fn hawk_resolver() -> Arc<LabelResolver> {
    let mut map = LabelMap::new();
    map.insert_if_absent("42", "Red-tailed Hawk");
    Arc::new(LabelResolver::new(map, "Species"))
}

/// Backend returning `(label, confidence)` for every crop, counting calls.
fn external_backend(
    config: &Config,
    label: &'static str,
    confidence: f32,
    calls: Arc<AtomicUsize>,
) -> ClassificationBackend {
    let mut registry = ClassifierRegistry::new();
    registry.register("hawks", "top1", move |_crop: &RgbImage| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok((label.to_string(), confidence))
    });
    try_build_backend(
        config.species.as_ref().unwrap(),
        Device::Cpu,
        hawk_resolver(),
        &registry,
    )
    .unwrap()
}

fn detector(model: ScriptedModel, config: &Config, backend: Option<ClassificationBackend>) -> SegmentationDetector {
    SegmentationDetector::from_parts(Box::new(model), Device::Cpu, config, backend)
}

#[test]
fn scenario_a_no_target_objects() {
    let person = RawInstance {
        bbox: [10.0, 10.0, 200.0, 400.0],
        confidence: 0.95,
        class_id: PERSON,
        mask: None,
    };
    let mut detector = detector(ScriptedModel::new(vec![person]), &Config::default(), None);

    assert!(detector.detect(&frame()).is_empty());
}

#[test]
fn scenario_b_bird_without_species_backend() {
    let mut detector = detector(ScriptedModel::new(vec![bird(0.9)]), &Config::default(), None);

    let detections = detector.detect(&frame());
    assert_eq!(detections.len(), 1);

    let det = &detections[0];
    assert_eq!(det.class_name(), "bird");
    assert_eq!(det.class_id(), BIRD);
    assert_eq!(det.confidence(), 0.9);
    assert_eq!(det.timestamp(), 1_700_000_000.25);
    assert!(det.species().is_none());
    assert!(det.species_confidence().is_none());

    let polygon = det.polygon().unwrap();
    assert!(polygon.len() >= 3);
    let bbox = det.bbox();
    for &(x, y) in polygon {
        assert!((bbox.x1..=bbox.x2).contains(&x), "x {x} outside {bbox:?}");
        assert!((bbox.y1..=bbox.y2).contains(&y), "y {y} outside {bbox:?}");
    }
}

#[test]
fn scenario_c_species_below_threshold_keeps_candidate() {
    let config = config(0.3);
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = external_backend(&config, "0042", 0.15, Arc::clone(&calls));
    let mut detector = detector(ScriptedModel::new(vec![bird(0.9)]), &config, Some(backend));

    let analysis = detector.analyze(&frame());
    assert_eq!(analysis.detections.len(), 1);
    assert!(analysis.detections[0].species().is_none());
    assert!(analysis.detections[0].species_confidence().is_none());

    let candidates = analysis.candidates_for(0);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].name, "Red-tailed Hawk");
    assert_eq!(candidates[0].confidence, 0.15);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn scenario_d_mapped_species_from_id_file() {
    let dir = tempfile::tempdir().unwrap();
    let id_map = dir.path().join("species_ids.csv");
    std::fs::write(&id_map, "id,name\n42,Red-tailed Hawk\n7,Peregrine Falcon\n").unwrap();

    let labels = LabelsConfig {
        id_map: Some(id_map),
        ..LabelsConfig::default()
    };
    let resolver = Arc::new(LabelResolver::build(&LabelSources::discover(None, &labels)));

    let config = config(0.3);
    let mut registry = ClassifierRegistry::new();
    registry.register("hawks", "top1", |_crop: &RgbImage| Ok(("0042".to_string(), 0.5)));
    let backend =
        try_build_backend(config.species.as_ref().unwrap(), Device::Cpu, resolver, &registry).unwrap();

    let mut detector = detector(ScriptedModel::new(vec![bird(0.9)]), &config, Some(backend));
    let detections = detector.detect(&frame());

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].species(), Some("Red-tailed Hawk"));
    assert_eq!(detections[0].species_confidence(), Some(0.5));
}

#[test]
fn scenario_e_unmapped_species_gets_placeholder() {
    let config = config(0.3);
    let backend = external_backend(&config, "0999", 0.5, Arc::new(AtomicUsize::new(0)));
    let mut detector = detector(ScriptedModel::new(vec![bird(0.9)]), &config, Some(backend));

    let detections = detector.detect(&frame());
    assert_eq!(detections[0].species(), Some("Species Class 0999"));
    assert_eq!(detections[0].species_confidence(), Some(0.5));
}

#[test]
fn low_confidence_instances_are_dropped() {
    let mut detector = detector(
        ScriptedModel::new(vec![bird(0.2), bird(0.34), bird(0.35)]),
        &Config::default(),
        None,
    );

    let detections = detector.detect(&frame());
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].confidence(), 0.35);
}

#[test]
fn instances_below_gate_are_not_classified() {
    let mut config = config(0.3);
    config.detector.confidence_threshold = 0.1;
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = external_backend(&config, "0042", 0.9, Arc::clone(&calls));
    let mut detector = detector(ScriptedModel::new(vec![bird(0.15)]), &config, Some(backend));

    let analysis = detector.analyze(&frame());
    assert_eq!(analysis.detections.len(), 1);
    assert!(analysis.detections[0].species().is_none());
    assert!(analysis.candidates_for(0).is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn boxes_are_clamped_to_frame() {
    let instance = RawInstance {
        bbox: [-30.0, 400.0, 700.0, 900.0],
        confidence: 0.8,
        class_id: BIRD,
        mask: None,
    };
    let mut detector = detector(ScriptedModel::new(vec![instance]), &Config::default(), None);

    let detections = detector.detect(&frame());
    let bbox = detections[0].bbox();
    assert!(bbox.x1 >= 0 && bbox.y1 >= 0);
    assert!(bbox.x2 <= FRAME_W as i32 && bbox.y2 <= FRAME_H as i32);
    assert!(bbox.x1 < bbox.x2 && bbox.y1 < bbox.y2);
    assert_eq!(detections[0].area(), i64::from(bbox.width()) * i64::from(bbox.height()));
    assert!(detections[0].polygon().is_none());
}

#[test]
fn classifier_sees_crop_at_configured_size() {
    let config = config(0.3);
    let sizes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&sizes);
    let mut registry = ClassifierRegistry::new();
    registry.register("hawks", "top1", move |crop: &RgbImage| {
        seen.lock().unwrap().push(crop.dimensions());
        Ok(("0042".to_string(), 0.8))
    });
    let backend = try_build_backend(
        config.species.as_ref().unwrap(),
        Device::Cpu,
        hawk_resolver(),
        &registry,
    )
    .unwrap();

    let mut detector = detector(ScriptedModel::new(vec![bird(0.9), bird(0.7)]), &config, Some(backend));
    let detections = detector.detect(&frame());

    assert_eq!(detections.len(), 2);
    assert_eq!(*sizes.lock().unwrap(), vec![(64, 64), (64, 64)]);
}

#[test]
fn failing_classifier_leaves_detection_unlabelled() {
    let config = config(0.3);
    let mut registry = ClassifierRegistry::new();
    registry.register("hawks", "top1", |_crop: &RgbImage| Err("camera offline".into()));
    let backend = try_build_backend(
        config.species.as_ref().unwrap(),
        Device::Cpu,
        hawk_resolver(),
        &registry,
    )
    .unwrap();

    let mut detector = detector(ScriptedModel::new(vec![bird(0.9)]), &config, Some(backend));
    let detections = detector.detect(&frame());

    assert_eq!(detections.len(), 1);
    assert!(detections[0].species().is_none());
}

#[test]
fn failing_model_yields_empty_frame() {
    let mut model = ScriptedModel::new(vec![bird(0.9)]);
    model.fail = true;
    let mut detector = detector(model, &Config::default(), None);

    assert!(detector.detect(&frame()).is_empty());
}

#[test]
fn empty_frame_yields_no_detections() {
    let mut detector = detector(ScriptedModel::new(vec![bird(0.9)]), &Config::default(), None);
    let empty = Frame::new(RgbImage::new(0, 0), ChannelOrder::Rgb);

    assert!(detector.detect(&empty).is_empty());
}

#[test]
fn legacy_class_id_is_bird_without_names() {
    let cat = RawInstance {
        bbox: [0.0, 0.0, 50.0, 50.0],
        confidence: 0.9,
        class_id: BIRD + 1,
        mask: None,
    };
    let model = ScriptedModel::new(vec![bird(0.9), cat]).without_names();
    let mut detector = detector(model, &Config::default(), None);

    let detections = detector.detect(&frame());
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].class_name(), "bird");
}

#[test]
fn update_config_changes_thresholds_and_classes() {
    let cat = RawInstance {
        bbox: [300.0, 300.0, 360.0, 350.0],
        confidence: 0.5,
        class_id: BIRD + 1,
        mask: None,
    };
    let mut detector = detector(
        ScriptedModel::new(vec![bird(0.5), cat]),
        &Config::default(),
        None,
    );
    assert_eq!(detector.detect(&frame()).len(), 1);

    let mut config = Config::default();
    config.detector.classes = vec!["Bird".to_string(), "cat".to_string()];
    config.detector.verbosity = Verbosity::Detailed;
    detector.update_config(&config);
    assert_eq!(detector.detect(&frame()).len(), 2);

    config.detector.confidence_threshold = 0.6;
    detector.update_config(&config);
    assert!(detector.detect(&frame()).is_empty());
}

#[test]
fn missing_external_classifier_disables_species() {
    let config = config(0.3);
    let registry = ClassifierRegistry::new();

    let result = try_build_backend(
        config.species.as_ref().unwrap(),
        Device::Cpu,
        hawk_resolver(),
        &registry,
    );
    assert!(matches!(result, Err(Error::ExternalClassifierMissing { .. })));
}

#[test]
fn unavailable_accelerator_selects_cpu() {
    let device = select_device_with(Some(DeviceHint::Accelerator(0)), &PlatformProbe::default());
    assert_eq!(device, Device::Cpu);
}

#[test]
fn detection_json_shape() {
    let config = config(0.3);
    let backend = external_backend(&config, "0042", 0.5, Arc::new(AtomicUsize::new(0)));
    let mut detector = detector(ScriptedModel::new(vec![bird(0.9)]), &config, Some(backend));

    let detections = detector.detect(&frame());
    let value = serde_json::to_value(&detections[0]).unwrap();

    assert_eq!(value["class_name"], "bird");
    assert_eq!(value["species"], "Red-tailed Hawk");
    assert_eq!(value["species_confidence"], 0.5);
    assert!(value["bbox"].is_object() || value["bbox"].is_array());
    assert!(value["polygon"].is_array());
}

#[test]
fn mask_touching_box_edge_keeps_polygon() {
    let mut mask = GrayImage::new(40, 30);
    for y in 3..27 {
        for x in 0..36 {
            mask.put_pixel(x, y, Luma([255]));
        }
    }
    let instance = RawInstance {
        mask: Some(InstanceMask {
            origin: (100, 100),
            mask,
        }),
        ..bird(0.9)
    };
    let mut detector = detector(ScriptedModel::new(vec![instance]), &Config::default(), None);

    let detections = detector.detect(&frame());
    let polygon = detections[0].polygon().unwrap();
    assert!(polygon.len() >= 3);
    assert_eq!(polygon.iter().map(|&(x, _)| x).min(), Some(100));
}

#[test]
fn gate_is_inclusive_at_point_two() {
    let mut config = config(0.3);
    config.detector.confidence_threshold = 0.1;
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = external_backend(&config, "0042", 0.3, Arc::clone(&calls));
    let mut detector = detector(
        ScriptedModel::new(vec![bird(0.20), bird(0.199_999)]),
        &config,
        Some(backend),
    );

    let detections = detector.detect(&frame());
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].species(), Some("Red-tailed Hawk"));
    assert_eq!(detections[0].species_confidence(), Some(0.3));
    assert!(detections[1].species().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn species_threshold_is_inclusive() {
    let config = config(0.3);
    let backend = external_backend(&config, "0042", 0.3, Arc::new(AtomicUsize::new(0)));
    let mut detector = detector(ScriptedModel::new(vec![bird(0.9)]), &config, Some(backend));

    let detections = detector.detect(&frame());
    assert_eq!(detections[0].species(), Some("Red-tailed Hawk"));
    assert_eq!(detections[0].species_confidence(), Some(0.3));
}
