use super::{Arc, ImageBuffer, ImageFrame, RenderImage, Rgba};
use sports_coach::pipeline::Canvas;

/// Copies the annotated canvas into a GPU image.
pub(super) fn canvas_to_image(canvas: &Canvas) -> Option<Arc<RenderImage>> {
    let mut bgra = canvas.pixels().to_vec();
    // GPUI expects BGRA.
    for px in bgra.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(canvas.width(), canvas.height(), bgra)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}
