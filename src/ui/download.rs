use std::path::PathBuf;

use super::{
    ActiveTheme, AnyElement, AppView, Context, DownloadMessage, DownloadState, IntoElement,
    ModelDownloadEvent, ParentElement, Sender, Styled, StyledExt, Tag, div,
    ensure_pose_model_ready, h_flex, thread, v_flex,
};

impl AppView {
    pub(super) fn poll_download_events(&mut self, state: &mut DownloadState) {
        while let Ok(msg) = self.download_rx.try_recv() {
            match msg {
                DownloadMessage::Event(ModelDownloadEvent::AlreadyPresent) => {
                    state.message = "Pose model found on disk".to_string();
                }
                DownloadMessage::Event(ModelDownloadEvent::Started { total }) => {
                    state.total = total;
                    state.message = "Downloading pose model...".to_string();
                }
                DownloadMessage::Event(ModelDownloadEvent::Progress { downloaded, total }) => {
                    state.downloaded = downloaded;
                    state.total = total;
                }
                DownloadMessage::Event(ModelDownloadEvent::Finished) => {
                    state.finished = true;
                    state.message = "Pose model ready, starting coach...".to_string();
                }
                DownloadMessage::Error(err) => {
                    state.error = Some(err);
                    state.finished = false;
                    state.message = "Pose model download failed".to_string();
                }
            }
        }
    }

    pub(super) fn render_download_view(
        &self,
        state: &DownloadState,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let theme = cx.theme();
        let detail = match (state.total, state.finished) {
            (_, true) => "Done".to_string(),
            (Some(total), false) if total > 0 => {
                format!("{} [{:.1}%]", progress_bar(state.downloaded, total), percent(state.downloaded, total))
            }
            _ => format!("Downloaded {} KB", state.downloaded / 1024),
        };

        let (status_text, status_color) = if state.error.is_some() {
            ("Model unavailable", theme.accent)
        } else if state.finished {
            ("Model ready", theme.success)
        } else {
            ("Preparing model", theme.foreground)
        };

        let mut container = v_flex()
            .gap_3()
            .p_6()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(div().text_color(status_color).font_semibold().child(status_text))
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.muted_foreground)
                            .child("MediaPipe pose landmarks"),
                    ),
            )
            .child(
                div()
                    .px_3()
                    .py_2()
                    .rounded_md()
                    .bg(theme.muted)
                    .font_family(theme.mono_font_family.clone())
                    .text_color(theme.foreground)
                    .child(detail),
            )
            .child(div().text_color(theme.foreground).child(state.message.clone()));

        if let Some(err) = &state.error {
            container = container.child(Tag::danger().rounded_full().child(format!("Error: {err}")));
        }

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(container)
            .into_any_element()
    }
}

pub(super) fn spawn_model_download(
    model_path: PathBuf,
    tx: Sender<DownloadMessage>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let result = ensure_pose_model_ready(&model_path, |event| {
            let _ = tx.send(DownloadMessage::Event(event));
        });

        if let Err(err) = result {
            log::error!("failed to download pose model: {err:?}");
            let _ = tx.send(DownloadMessage::Error(format!("{err:#}")));
        }
    })
}

fn percent(downloaded: u64, total: u64) -> f64 {
    (downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

fn progress_bar(downloaded: u64, total: u64) -> String {
    const BAR_LEN: usize = 30;
    let filled = ((percent(downloaded, total) / 100.0 * BAR_LEN as f64).round() as usize).min(BAR_LEN);
    format!("[{}{}]", "=".repeat(filled), " ".repeat(BAR_LEN - filled))
}
