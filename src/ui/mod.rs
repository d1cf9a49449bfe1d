use std::{mem, sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender, unbounded};
use gpui::{
    AnyElement, App, AppContext, Context, IntoElement, ObjectFit, ParentElement, Render,
    RenderImage, SharedString, Styled, StyledImage, TitlebarOptions, Window, WindowOptions, div,
    img, px,
};
use gpui_component::{
    ActiveTheme, Root, StyledExt,
    button::{Button, ButtonVariants},
    h_flex,
    tag::Tag,
    v_flex,
};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use sports_coach::{
    config::Config,
    feedback::{AudioOutput, FeedbackChannel, WsTransport},
    model_download::{ModelDownloadEvent, ensure_pose_model_ready},
    pipeline::{CaptureSource, OrtPoseSource, SkeletonRenderer},
    session::{SessionController, SessionParts, SessionSettings},
    speech::CommandSpeaker,
};

mod download;
mod main_view;
mod render_util;

const PREVIEW_MAX_WIDTH: f32 = 720.0;

pub fn launch_ui(app: &mut App, config: Config) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Sports Coach".into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| AppView::new(config));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

struct AppView {
    config: Config,
    screen: Screen,
    session: Option<SessionController>,
    preview: Option<Arc<RenderImage>>,
    preview_dirty: bool,
    download_rx: Receiver<DownloadMessage>,
    _download_handle: thread::JoinHandle<()>,
}

enum Screen {
    Download(DownloadState),
    Main,
}

struct DownloadState {
    downloaded: u64,
    total: Option<u64>,
    message: String,
    error: Option<String>,
    finished: bool,
}

impl DownloadState {
    fn new() -> Self {
        Self {
            downloaded: 0,
            total: None,
            message: "Checking pose model...".to_string(),
            error: None,
            finished: false,
        }
    }
}

enum DownloadMessage {
    Event(ModelDownloadEvent),
    Error(String),
}

impl AppView {
    fn new(config: Config) -> Self {
        let (download_tx, download_rx) = unbounded();
        let download_handle = download::spawn_model_download(config.model_path.clone(), download_tx);

        Self {
            config,
            screen: Screen::Download(DownloadState::new()),
            session: None,
            preview: None,
            preview_dirty: false,
            download_rx,
            _download_handle: download_handle,
        }
    }

    fn start_session_if_needed(&mut self) -> anyhow::Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        self.session = Some(build_session(&self.config)?);
        Ok(())
    }
}

fn build_session(config: &Config) -> anyhow::Result<SessionController> {
    let landmarks = OrtPoseSource::new(&config.model_path, config.min_detection_confidence)?;
    let audio = AudioOutput::from_config(config).into_sink(config.audio_spool_dir.clone());

    let parts = SessionParts {
        capture: capture_source(config),
        landmarks: Box::new(landmarks),
        renderer: Box::new(SkeletonRenderer::default()),
        channel: FeedbackChannel::new(Box::new(WsTransport::new()), audio),
        speaker: Box::new(CommandSpeaker::new(config.speech_command.clone())),
    };
    log::info!("session ready, feedback endpoint {}", config.server_url);
    Ok(SessionController::new(parts, SessionSettings::from(config)))
}

#[cfg(feature = "camera-nokhwa")]
fn capture_source(config: &Config) -> Box<dyn CaptureSource> {
    Box::new(sports_coach::pipeline::NokhwaCapture::new(&config.camera))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn capture_source(_config: &Config) -> Box<dyn CaptureSource> {
    log::warn!("built without camera support");
    Box::new(sports_coach::pipeline::NoCamera)
}

impl Render for AppView {
    fn render(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> impl gpui::IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        let mut screen = mem::replace(&mut self.screen, Screen::Main);
        let view = match screen {
            Screen::Download(mut state) => {
                self.poll_download_events(&mut state);
                if state.finished && state.error.is_none() {
                    if let Err(err) = self.start_session_if_needed() {
                        log::error!("failed to load pose model: {err:?}");
                        state.error = Some(format!("{err:#}"));
                        state.message = "Pose model could not be loaded".to_string();
                    }
                }
                let view = self.render_download_view(&state, cx);
                screen = if self.session.is_some() {
                    Screen::Main
                } else {
                    Screen::Download(state)
                };
                view
            }
            Screen::Main => {
                screen = Screen::Main;
                self.render_main(window, cx)
            }
        };
        self.screen = screen;
        view
    }
}
