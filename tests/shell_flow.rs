use std::{
  cell::{Cell, RefCell},
  path::PathBuf,
  rc::Rc,
  sync::Arc,
  time::Duration,
};

use headcount::{
  acquisition::{
    AcquisitionError, AcquisitionResult, CameraActivity, CaptureTarget, MissingCamera,
    PathGalleryPicker, ResultCode,
  },
  decoder::DecodeOptions,
  detector::{DetectError, DetectedFace, FaceDetector},
  display::{CountLabel, DetectionClient, Notifier},
  event::{self, CycleId, Event, EventReceiver, EventSender},
  permission::{PERMISSION_GRANTED, PERMISSION_REQUIRED, PermissionHost, PermissionState},
  shell::{CycleState, DECODE_FAILED, Shell, ShellConfig},
};
use image::{Rgb, RgbImage, RgbaImage};

const TIMEOUT: Duration = Duration::from_secs(5);

fn scratch_dir(name: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!("headcount-it-{}-{}", name, std::process::id()));
  let _ = std::fs::remove_dir_all(&dir);
  std::fs::create_dir_all(&dir).unwrap();
  dir
}

fn write_image(dir: &PathBuf, name: &str, width: u32) -> String {
  let path = dir.join(name);
  RgbImage::from_pixel(width, 24, Rgb([90, 90, 90]))
    .save(&path)
    .unwrap();
  path.display().to_string()
}

/// 按图像宽度决定结果：宽 30 → 3 张脸（慢），宽 40 → 0 张脸，宽 50 → 失败
struct WidthDetector;

impl FaceDetector for WidthDetector {
  fn detect(&self, image: &RgbaImage) -> Result<Vec<DetectedFace>, DetectError> {
    let face = DetectedFace {
      bbox: [1.0, 1.0, 5.0, 5.0],
      score: 4.0,
      tracking_id: None,
    };
    match image.width() {
      30 => {
        std::thread::sleep(Duration::from_millis(300));
        Ok(vec![face; 3])
      }
      40 => Ok(vec![]),
      50 => Err(DetectError::Internal("model exploded".to_string())),
      n => Ok(vec![face; (n / 10) as usize]),
    }
  }
}

#[derive(Clone, Default)]
struct Screen {
  texts: Rc<RefCell<Vec<String>>>,
  messages: Rc<RefCell<Vec<String>>>,
}

impl Screen {
  fn last_message(&self) -> String {
    self.messages.borrow().last().cloned().unwrap_or_default()
  }
}

struct Label(Screen, String);

impl CountLabel for Label {
  fn set_text(&mut self, text: &str) {
    self.1 = text.to_string();
    self.0.texts.borrow_mut().push(text.to_string());
  }

  fn text(&self) -> &str {
    &self.1
  }
}

struct Messages(Screen);

impl Notifier for Messages {
  fn show(&mut self, message: &str) {
    self.0.messages.borrow_mut().push(message.to_string());
  }

  fn show_with_action(&mut self, message: &str, action: &str) {
    self
      .0
      .messages
      .borrow_mut()
      .push(format!("{} [{}]", message, action));
  }
}

#[derive(Clone, Default)]
struct HostState {
  granted: Rc<Cell<bool>>,
  rationale: Rc<Cell<bool>>,
  requests: Rc<Cell<u32>>,
  answer: Rc<Cell<bool>>,
}

struct FakeHost(HostState);

impl PermissionHost for FakeHost {
  fn check(&self) -> bool {
    self.0.granted.get()
  }

  fn should_show_rationale(&self) -> bool {
    self.0.rationale.get()
  }

  fn request(&mut self, reply: EventSender) {
    self.0.requests.set(self.0.requests.get() + 1);
    let answer = self.0.answer.get();
    self.0.granted.set(answer);
    reply.send(Event::PermissionResult(answer)).unwrap();
  }
}

/// 把一张 20 像素宽的图片写入目标位置；`cancel` 时什么也不写
struct FakeCamera {
  launches: Rc<Cell<u32>>,
  cancel: Rc<Cell<bool>>,
}

impl CameraActivity for FakeCamera {
  fn launch(
    &mut self,
    cycle: CycleId,
    target: &CaptureTarget,
    reply: EventSender,
  ) -> Result<(), AcquisitionError> {
    self.launches.set(self.launches.get() + 1);
    if self.cancel.get() {
      reply
        .send(Event::Acquired(AcquisitionResult::Camera {
          cycle,
          code: ResultCode::Canceled,
          target: target.reference().clone(),
        }))
        .unwrap();
      return Ok(());
    }
    let mut file = target.provide()?;
    RgbImage::from_pixel(20, 24, Rgb([1, 2, 3]))
      .write_to(&mut file, image::ImageFormat::Png)
      .map_err(|e| AcquisitionError::NoCameraApp(e.to_string()))?;
    reply
      .send(Event::Acquired(AcquisitionResult::Camera {
        cycle,
        code: ResultCode::Ok,
        target: target.reference().clone(),
      }))
      .unwrap();
    Ok(())
  }
}

struct Harness {
  shell: Shell,
  rx: EventReceiver,
  screen: Screen,
  host: HostState,
  launches: Rc<Cell<u32>>,
  cancel: Rc<Cell<bool>>,
  dir: PathBuf,
}

fn harness(name: &str, camera_present: bool, discard_stale: bool) -> Harness {
  let dir = scratch_dir(name);
  let (tx, rx) = event::channel();
  let screen = Screen::default();
  let host = HostState::default();
  let launches = Rc::new(Cell::new(0));
  let cancel = Rc::new(Cell::new(false));

  let builder = Shell::builder()
    .permission_host(FakeHost(host.clone()))
    .gallery(PathGalleryPicker)
    .detection(DetectionClient::new(Arc::new(WidthDetector)))
    .label(Label(screen.clone(), String::new()))
    .notifier(Messages(screen.clone()))
    .config(ShellConfig {
      pictures_dir: dir.join("Pictures"),
      decode: DecodeOptions::default(),
      discard_stale,
      report_json: false,
    });
  let builder = if camera_present {
    builder.camera(FakeCamera {
      launches: Rc::clone(&launches),
      cancel: Rc::clone(&cancel),
    })
  } else {
    builder.camera(MissingCamera)
  };

  Harness {
    shell: builder.build(tx).unwrap(),
    rx,
    screen,
    host,
    launches,
    cancel,
    dir,
  }
}

impl Harness {
  fn input(&mut self, line: &str) {
    let _ = self.shell.handle(Event::Input(line.to_string()));
  }

  /// 处理 `count` 个异步事件
  fn pump(&mut self, count: usize) {
    for _ in 0..count {
      let event = self.rx.recv_timeout(TIMEOUT).expect("event expected");
      let _ = self.shell.handle(event);
    }
  }

  fn state(&self) -> Option<CycleState> {
    self.shell.current().map(|c| c.state)
  }
}

impl Drop for Harness {
  fn drop(&mut self) {
    let _ = std::fs::remove_dir_all(&self.dir);
  }
}

#[test]
fn gallery_pick_displays_count() {
  let mut h = harness("gallery", true, false);
  let image = write_image(&h.dir, "three.png", 30);

  h.input(&format!("gallery {}", image));
  h.pump(1);
  assert_eq!(h.state(), Some(CycleState::Detecting));
  h.pump(1);

  assert_eq!(h.shell.label_text(), "Face Count = 3");
  assert_eq!(h.state(), Some(CycleState::Displayed));
  assert_eq!(h.screen.texts.borrow().len(), 1);
}

#[test]
fn empty_detection_reads_zero() {
  let mut h = harness("zero", true, false);
  let image = write_image(&h.dir, "nobody.png", 40);

  h.input(&format!("gallery {}", image));
  h.pump(2);
  assert_eq!(h.shell.label_text(), "Face Count = 0");
}

#[test]
fn last_completion_wins_by_default() {
  let mut h = harness("race", true, false);
  let slow = write_image(&h.dir, "a.png", 30);
  let fast = write_image(&h.dir, "b.png", 40);

  h.input(&format!("gallery {}", slow));
  h.pump(1);
  h.input(&format!("gallery {}", fast));
  h.pump(1);
  // B 先完成，A 后完成
  h.pump(2);

  assert_eq!(
    *h.screen.texts.borrow(),
    vec!["Face Count = 0".to_string(), "Face Count = 3".to_string()]
  );
  assert_eq!(h.shell.label_text(), "Face Count = 3");
  assert_eq!(h.shell.current().unwrap().id, CycleId(2));
}

#[test]
fn discard_stale_keeps_latest_request() {
  let mut h = harness("stale", true, true);
  let slow = write_image(&h.dir, "a.png", 30);
  let fast = write_image(&h.dir, "b.png", 40);

  h.input(&format!("gallery {}", slow));
  h.pump(1);
  h.input(&format!("gallery {}", fast));
  h.pump(3);

  assert_eq!(h.shell.label_text(), "Face Count = 0");
  assert_eq!(h.screen.texts.borrow().len(), 1);
}

#[test]
fn corrupt_image_fails_without_label_update() {
  let mut h = harness("corrupt", true, false);
  let path = h.dir.join("broken.png");
  std::fs::write(&path, b"\x89PNG but not really").unwrap();

  h.input(&format!("gallery {}", path.display()));
  h.pump(1);

  assert_eq!(h.state(), Some(CycleState::Failed));
  assert_eq!(h.screen.last_message(), DECODE_FAILED);
  assert!(h.screen.texts.borrow().is_empty());
  assert!(h.rx.try_recv().is_err());
}

#[test]
fn detector_failure_is_surfaced() {
  let mut h = harness("detect-fail", true, false);
  let image = write_image(&h.dir, "bad.png", 50);

  h.input(&format!("gallery {}", image));
  h.pump(2);

  assert_eq!(h.state(), Some(CycleState::Failed));
  assert!(h.screen.last_message().contains("model exploded"));
  assert!(h.screen.texts.borrow().is_empty());
}

#[test]
fn canceled_pick_says_sorry() {
  let mut h = harness("cancel", true, false);
  h.input("gallery");
  h.pump(1);
  assert_eq!(h.screen.last_message(), "sorry canceled");
  assert_eq!(h.state(), Some(CycleState::Failed));
}

#[test]
fn camera_without_permission_routes_to_gate() {
  let mut h = harness("no-permission", true, false);
  h.host.answer.set(false);

  h.input("camera");
  assert_eq!(h.host.requests.get(), 1);
  h.pump(1);

  assert_eq!(h.launches.get(), 0);
  assert_eq!(h.shell.gate().state(), PermissionState::Denied);
  assert!(h.shell.current().is_none());
}

#[test]
fn rationale_then_grant_then_capture() {
  let mut h = harness("rationale", true, false);
  h.host.rationale.set(true);
  h.host.answer.set(true);

  h.shell.start();
  assert_eq!(h.host.requests.get(), 0);
  assert_eq!(
    h.screen.last_message(),
    format!("{} [OK]", PERMISSION_REQUIRED)
  );

  h.input("ok");
  assert_eq!(h.host.requests.get(), 1);
  h.pump(1);
  assert_eq!(h.shell.gate().state(), PermissionState::Granted);
  assert_eq!(h.screen.last_message(), PERMISSION_GRANTED);

  h.input("camera");
  assert_eq!(h.launches.get(), 1);
  h.pump(2);
  assert_eq!(h.shell.label_text(), "Face Count = 2");

  let reference = h.shell.current().unwrap().reference.clone().unwrap();
  let name = reference
    .to_path()
    .unwrap()
    .file_name()
    .unwrap()
    .to_string_lossy()
    .to_string();
  assert!(name.starts_with("photo.jpg") && name.ends_with(".jpg"));
}

#[test]
fn missing_camera_fails_gracefully() {
  let mut h = harness("no-camera", false, false);
  h.host.granted.set(true);

  h.shell.start();
  assert_eq!(h.screen.last_message(), PERMISSION_GRANTED);

  h.input("camera");
  assert_eq!(h.state(), Some(CycleState::Failed));
  assert!(h.screen.last_message().contains("No activity found"));

  let leftovers = std::fs::read_dir(h.dir.join("Pictures")).unwrap().count();
  assert_eq!(leftovers, 0);
}

#[test]
fn canceled_capture_leaves_no_file() {
  let mut h = harness("capture-cancel", true, false);
  h.host.granted.set(true);
  h.cancel.set(true);

  h.shell.start();
  h.input("camera");
  h.pump(1);

  assert_eq!(h.screen.last_message(), "sorry canceled");
  assert_eq!(h.state(), Some(CycleState::Failed));
  let leftovers = std::fs::read_dir(h.dir.join("Pictures")).unwrap().count();
  assert_eq!(leftovers, 0);
}
