// Dispatch and cache behavior of the interrogator, driven by a fake loader

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::DynamicImage;

use seer::config::Options;
use seer::core::{Family, ImageInput, ResolvedModel};
use seer::models::session::Placement;
use seer::models::{LoadSpec, ModelLoader, VisionLanguageModel};
use seer::runtime::Device;
use seer::{ErrorKind, Interrogator};

#[derive(Default)]
struct Probe {
    loads: AtomicUsize,
    fail_load: AtomicBool,
    fail_answer: AtomicBool,
    no_accelerator: AtomicBool,
    moves: AtomicUsize,
    device: Mutex<Option<Device>>,
    last_spec: Mutex<Option<LoadSpec>>,
}

struct FakeModel {
    family: Family,
    placement: Placement,
    probe: Arc<Probe>,
}

impl Probe {
    /// Device a session requested on `device` would run on
    fn effective(&self, device: Device) -> Device {
        if self.no_accelerator.load(Ordering::SeqCst) {
            Device::Cpu
        } else {
            device
        }
    }
}

impl VisionLanguageModel for FakeModel {
    fn family(&self) -> Family {
        self.family
    }

    fn device(&self) -> Device {
        self.placement.device()
    }

    fn place(&mut self, device: Device) -> anyhow::Result<()> {
        if let Some(target) = self.placement.target(device) {
            self.probe.moves.fetch_add(1, Ordering::SeqCst);
            self.placement.settle(target, self.probe.effective(target));
        }
        *self.probe.device.lock().unwrap() = Some(self.placement.device());
        Ok(())
    }

    fn answer(&mut self, question: &str, _image: &DynamicImage, _options: &Options) -> anyhow::Result<String> {
        if self.probe.fail_answer.load(Ordering::SeqCst) {
            anyhow::bail!("decoder exploded");
        }
        Ok(format!("{}: {}", self.family, question))
    }
}

struct FakeLoader {
    probe: Arc<Probe>,
}

impl ModelLoader for FakeLoader {
    fn load(&self, spec: &LoadSpec) -> anyhow::Result<Box<dyn VisionLanguageModel>> {
        *self.probe.last_spec.lock().unwrap() = Some(spec.clone());
        if self.probe.fail_load.load(Ordering::SeqCst) {
            anyhow::bail!("artifact not found");
        }
        self.probe.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeModel {
            family: spec.family,
            placement: Placement::new(spec.device, self.probe.effective(spec.device)),
            probe: self.probe.clone(),
        }))
    }
}

fn interrogator(offload: bool) -> (Interrogator<FakeLoader>, Arc<Probe>) {
    let probe = Arc::new(Probe::default());
    let options = Options {
        offload,
        ..Options::default()
    };
    let loader = FakeLoader { probe: probe.clone() };
    (Interrogator::with_loader(loader, options), probe)
}

fn pixel() -> DynamicImage {
    DynamicImage::new_rgb8(4, 4)
}

#[test]
fn test_dispatches_to_catalog_family() {
    let (vqa, _) = interrogator(true);

    assert_eq!(vqa.interrogate("what?", pixel(), Some("BLIP Base")), "blip: what?");
    assert_eq!(vqa.interrogate("what?", pixel(), Some("ViLT Base")), "vilt: what?");
    assert_eq!(vqa.interrogate("<OCR>", pixel(), Some("MS Florence 2 Base")), "florence: <OCR>");
    assert_eq!(vqa.interrogate("what?", pixel(), Some("GIT VQA Base")), "git: what?");
    assert_eq!(vqa.interrogate("", pixel(), Some("Pix Textcaps")), "pix2struct: ");
    assert_eq!(vqa.interrogate("hi", pixel(), Some("Moondream 2")), "moondream: hi");
}

#[test]
fn test_unknown_model_is_a_diagnostic() {
    let (vqa, probe) = interrogator(true);

    let answer = vqa.interrogate("what?", pixel(), Some("Not A Model"));
    assert!(answer.starts_with("unknown: model=Not A Model available="), "{}", answer);
    assert!(answer.contains("BLIP Base"));
    assert_eq!(probe.loads.load(Ordering::SeqCst), 0);

    let err = vqa.ask("what?", pixel(), Some("Not A Model")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownModel);
}

#[test]
fn test_missing_model_name() {
    let (vqa, _) = interrogator(true);
    assert_eq!(vqa.interrogate("what?", pixel(), None), "no model selected");
}

#[test]
fn test_missing_image_answers_empty() {
    let (vqa, probe) = interrogator(true);

    assert_eq!(vqa.interrogate("what?", ImageInput::None, Some("BLIP Base")), "");
    assert_eq!(vqa.interrogate("what?", Vec::<DynamicImage>::new(), Some("BLIP Base")), "");
    assert_eq!(vqa.interrogate("what?", None::<DynamicImage>, None), "");
    assert_eq!(probe.loads.load(Ordering::SeqCst), 0);
}

#[test]
fn test_list_uses_first_image() {
    let (vqa, _) = interrogator(true);
    let answer = vqa.interrogate("what?", vec![pixel(), pixel()], Some("BLIP Base"));
    assert_eq!(answer, "blip: what?");
}

#[test]
fn test_reference_loads_image_from_path() {
    let (vqa, _) = interrogator(true);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pixel.png");
    pixel().save(&path).unwrap();

    assert_eq!(vqa.interrogate("what?", path.as_path(), Some("BLIP Base")), "blip: what?");
}

#[test]
fn test_unreadable_reference_is_an_error() {
    let (vqa, _) = interrogator(true);
    let missing = ImageInput::from_path("does/not/exist.png");

    let err = vqa.ask("what?", missing.clone(), Some("BLIP Base")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Load);
    assert_eq!(vqa.interrogate("what?", missing, Some("BLIP Base")), "error");
}

#[test]
fn test_reload_only_when_model_changes() {
    let (vqa, probe) = interrogator(true);

    vqa.interrogate("a", pixel(), Some("BLIP Base"));
    vqa.interrogate("b", pixel(), Some("BLIP Base"));
    assert_eq!(probe.loads.load(Ordering::SeqCst), 1);

    vqa.interrogate("c", pixel(), Some("ViLT Base"));
    assert_eq!(probe.loads.load(Ordering::SeqCst), 2);

    vqa.interrogate("d", pixel(), Some("ViLT Base"));
    vqa.interrogate("e", pixel(), Some("ViLT Base"));
    assert_eq!(probe.loads.load(Ordering::SeqCst), 2);

    vqa.interrogate("f", pixel(), Some("BLIP Base"));
    assert_eq!(probe.loads.load(Ordering::SeqCst), 3);
    assert_eq!(vqa.loads(), 3);
    assert_eq!(vqa.loaded().unwrap().repo_id, "Salesforce/blip-vqa-base");
}

#[test]
fn test_revision_is_split_from_repository() {
    let (vqa, probe) = interrogator(true);

    vqa.interrogate("hi", pixel(), Some("Moondream 2"));

    let id = vqa.loaded().unwrap();
    assert_eq!(id.repo_id, "vikhyatk/moondream2");
    assert_eq!(id.revision.as_deref(), Some("2024-08-26"));

    let spec = probe.last_spec.lock().unwrap().clone().unwrap();
    assert_eq!(spec.family, Family::Moondream);
}

#[test]
fn test_adapter_failure_answers_error() {
    let (vqa, probe) = interrogator(true);
    probe.fail_answer.store(true, Ordering::SeqCst);

    assert_eq!(vqa.interrogate("what?", pixel(), Some("BLIP Base")), "error");

    let err = vqa.ask("what?", pixel(), Some("BLIP Base")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Inference);
    assert!(err.to_string().contains("decoder exploded"));

    // The model stays resident after an inference failure
    assert_eq!(probe.loads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failed_load_leaves_cache_empty() {
    let (vqa, probe) = interrogator(true);

    vqa.interrogate("a", pixel(), Some("BLIP Base"));
    assert!(vqa.loaded().is_some());

    probe.fail_load.store(true, Ordering::SeqCst);
    assert_eq!(vqa.interrogate("b", pixel(), Some("ViLT Base")), "error");
    assert!(vqa.loaded().is_none());

    probe.fail_load.store(false, Ordering::SeqCst);
    assert_eq!(vqa.interrogate("c", pixel(), Some("BLIP Base")), "blip: c");
    assert_eq!(probe.loads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_offload_moves_model_to_cpu() {
    let (vqa, probe) = interrogator(true);

    vqa.interrogate("a", pixel(), Some("BLIP Base"));
    assert_eq!(*probe.device.lock().unwrap(), Some(Device::Cpu));
}

#[test]
fn test_offload_happens_after_failures_too() {
    let (vqa, probe) = interrogator(true);
    probe.fail_answer.store(true, Ordering::SeqCst);

    assert_eq!(vqa.interrogate("a", pixel(), Some("BLIP Base")), "error");
    assert_eq!(*probe.device.lock().unwrap(), Some(Device::Cpu));
}

#[test]
fn test_no_offload_keeps_model_on_accelerator() {
    let (vqa, probe) = interrogator(false);

    vqa.interrogate("a", pixel(), Some("BLIP Base"));
    assert_eq!(*probe.device.lock().unwrap(), Some(Device::Accelerator));
}

#[test]
fn test_cpu_only_host_never_moves_sessions() {
    let (vqa, probe) = interrogator(true);
    probe.no_accelerator.store(true, Ordering::SeqCst);

    for question in ["a", "b", "c"] {
        assert_eq!(vqa.interrogate(question, pixel(), Some("BLIP Base")), format!("blip: {}", question));
    }

    assert_eq!(probe.loads.load(Ordering::SeqCst), 1);
    assert_eq!(probe.moves.load(Ordering::SeqCst), 0);
    assert_eq!(*probe.device.lock().unwrap(), Some(Device::Cpu));
}

#[test]
fn test_accelerated_host_moves_between_calls() {
    let (vqa, probe) = interrogator(true);

    // Loaded on the accelerator, offloaded after the first answer
    vqa.interrogate("a", pixel(), Some("BLIP Base"));
    assert_eq!(probe.moves.load(Ordering::SeqCst), 1);

    // Promoted for the second answer, offloaded again
    vqa.interrogate("b", pixel(), Some("BLIP Base"));
    assert_eq!(probe.moves.load(Ordering::SeqCst), 3);
}

#[test]
fn test_resident_model_stays_put_without_offload() {
    let (vqa, probe) = interrogator(false);

    vqa.interrogate("a", pixel(), Some("BLIP Base"));
    vqa.interrogate("b", pixel(), Some("BLIP Base"));
    assert_eq!(probe.moves.load(Ordering::SeqCst), 0);
}

#[test]
fn test_family_is_part_of_cache_key() {
    let (vqa, probe) = interrogator(true);
    let blip = ResolvedModel::from_repo("someone/blip-finetune").unwrap();
    let as_vilt = ResolvedModel {
        family: Family::Vilt,
        ..blip.clone()
    };

    assert_eq!(vqa.interrogate_model("q", pixel(), &blip), "blip: q");
    assert_eq!(vqa.interrogate_model("q", pixel(), &as_vilt), "vilt: q");
    assert_eq!(probe.loads.load(Ordering::SeqCst), 2);
    assert_eq!(vqa.loaded().unwrap().family, Family::Vilt);
}

#[test]
fn test_ad_hoc_repository() {
    let (vqa, probe) = interrogator(true);
    let model = ResolvedModel::from_repo("someone/my-vilt-finetune@v2").unwrap();

    assert_eq!(vqa.interrogate_model("what?", pixel(), &model), "vilt: what?");

    let spec = probe.last_spec.lock().unwrap().clone().unwrap();
    assert_eq!(spec.id.repo_id, "someone/my-vilt-finetune");
    assert_eq!(spec.id.revision.as_deref(), Some("v2"));
}

#[test]
fn test_shared_across_threads() {
    let (vqa, probe) = interrogator(false);

    std::thread::scope(|scope| {
        for i in 0..4 {
            let vqa = &vqa;
            scope.spawn(move || {
                let answer = vqa.interrogate(&format!("q{}", i), pixel(), Some("BLIP Base"));
                assert_eq!(answer, format!("blip: q{}", i));
            });
        }
    });

    assert_eq!(probe.loads.load(Ordering::SeqCst), 1);
}
