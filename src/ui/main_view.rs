use std::sync::Arc;

use sports_coach::{session::SessionPhase, types::Activity};

use super::render_util::canvas_to_image;
use super::{
    ActiveTheme, AnyElement, AppView, Button, ButtonVariants, Context, IntoElement, ObjectFit,
    PREVIEW_MAX_WIDTH, ParentElement, RenderImage, SharedString, Styled, StyledExt, StyledImage,
    Tag, Window, div, h_flex, img, px, v_flex,
};

impl AppView {
    pub(super) fn render_main(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let Some(session) = self.session.as_mut() else {
            return div().size_full().into_any_element();
        };

        let changed = session.pump();
        let camera_enabled = session.camera_enabled();
        let activity = session.activity();
        let phase = session.phase();
        let feedback = session.feedback().map(str::to_string);
        let last_error = session.last_error().map(str::to_string);
        let stats = session.stats();
        let (canvas_width, canvas_height) = (session.canvas().width(), session.canvas().height());

        let fresh = if camera_enabled && (changed || self.preview_dirty) {
            canvas_to_image(session.canvas())
        } else {
            None
        };
        if !camera_enabled {
            self.drop_preview(window, cx);
        } else if let Some(image) = fresh {
            self.replace_preview(image, window, cx);
        }
        self.preview_dirty = false;

        let mut activity_row = h_flex().gap_2().items_center();
        for choice in Activity::ALL {
            let button = Button::new(SharedString::from(format!("activity-{}", choice.as_str())))
                .label(choice.display_name())
                .on_click(cx.listener(move |this, _, _, cx| {
                    if let Some(session) = this.session.as_mut() {
                        session.set_activity(choice);
                        this.preview_dirty = true;
                    }
                    cx.notify();
                }));
            activity_row = activity_row.child(if choice == activity {
                button.primary()
            } else {
                button.outline()
            });
        }

        let toggle_label = if camera_enabled {
            "Stop camera"
        } else {
            "Start camera"
        };
        let toggle = Button::new(SharedString::from("camera-toggle"))
            .primary()
            .label(toggle_label)
            .on_click(cx.listener(move |this, _, _, cx| {
                if let Some(session) = this.session.as_mut() {
                    session.set_camera_enabled(!camera_enabled);
                    this.preview_dirty = true;
                }
                cx.notify();
            }));

        let theme = cx.theme();
        let phase_color = match phase {
            SessionPhase::Live => theme.success,
            SessionPhase::Offline => theme.accent,
            SessionPhase::Idle | SessionPhase::Starting => theme.muted_foreground,
        };

        let preview_width = (canvas_width as f32).min(PREVIEW_MAX_WIDTH);
        let preview_height = preview_width * canvas_height as f32 / canvas_width.max(1) as f32;
        let preview: AnyElement = match (&self.preview, camera_enabled) {
            (Some(image), true) => img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element(),
            (_, true) => div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(theme.muted_foreground)
                .child("Waiting for camera...")
                .into_any_element(),
            (_, false) => div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(theme.muted_foreground)
                .child("Camera is off")
                .into_any_element(),
        };

        let feedback_panel = v_flex()
            .gap_1()
            .p_3()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                div()
                    .text_sm()
                    .text_color(theme.muted_foreground)
                    .child("Coach feedback"),
            )
            .child(
                div()
                    .text_color(theme.foreground)
                    .child(feedback.unwrap_or_else(|| "No feedback yet".to_string())),
            );

        let mut content = v_flex()
            .gap_3()
            .p_4()
            .w(px(preview_width))
            .child(
                h_flex()
                    .justify_between()
                    .items_center()
                    .child(div().text_lg().font_semibold().child(format!(
                        "{} coach",
                        activity.display_name()
                    )))
                    .child(div().text_sm().text_color(phase_color).child(phase.label())),
            )
            .child(activity_row)
            .child(
                div()
                    .w(px(preview_width))
                    .h(px(preview_height))
                    .overflow_hidden()
                    .rounded_lg()
                    .bg(gpui::rgb(0x000000))
                    .child(preview),
            )
            .child(
                h_flex()
                    .gap_2()
                    .justify_between()
                    .items_center()
                    .child(toggle)
                    .child(
                        div()
                            .text_xs()
                            .text_color(theme.muted_foreground)
                            .child(format!(
                                "sent {} / dropped {} / skipped {}",
                                stats.frames_sent, stats.sends_dropped, stats.frames_skipped
                            )),
                    ),
            )
            .child(feedback_panel);

        if let Some(err) = last_error {
            content = content.child(Tag::danger().rounded_full().child(err));
        }

        v_flex()
            .size_full()
            .items_center()
            .bg(theme.background)
            .child(content)
            .into_any_element()
    }

    fn replace_preview(
        &mut self,
        image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old) = self.preview.replace(image) {
            // The sprite atlas keeps every texture until it is dropped explicitly.
            cx.drop_image(old, Some(window));
        }
    }

    fn drop_preview(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        if let Some(old) = self.preview.take() {
            cx.drop_image(old, Some(window));
        }
    }
}
