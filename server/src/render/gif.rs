use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::{debug, info};

use common::{Board, Game, GameFrame};

use super::image::BoardRenderer;
use super::quantize::{quantize, PalettedImage};

/// Default delay between animation frames, in centiseconds.
pub const GIF_FRAME_DELAY: u16 = 8;
/// Default delay on the final frame before the animation loops.
pub const GIF_LOOP_DELAY: u16 = 200;

/// Short ranges play too fast to follow at the default delay.
const SHORT_RANGE_FRAMES: usize = 10;
const SHORT_RANGE_FRAME_DELAY: u16 = 16;

/// One frame of an animation, ready for the encoder.
#[derive(Debug)]
pub struct GifFrame {
    pub image: PalettedImage,
    pub frame_num: usize,
    /// Display delay in centiseconds.
    pub delay: u16,
}

pub type FrameResult = Result<GifFrame>;

/// Wraps the output sink so an aborted encode can suppress everything the
/// encoder would still write (notably the trailer emitted on drop).
struct AbortableSink<W: Write> {
    inner: W,
    armed: bool,
}

impl<W: Write> AbortableSink<W> {
    fn new(inner: W) -> Self {
        AbortableSink { inner, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<W: Write> Write for AbortableSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.armed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "encode aborted"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.armed {
            return Ok(());
        }
        self.inner.flush()
    }
}

fn frame_to_gif_frame(image: &PalettedImage, delay: u16) -> gif::Frame<'_> {
    let mut frame = gif::Frame::default();
    frame.width = image.width;
    frame.height = image.height;
    frame.buffer = Cow::Borrowed(&image.pixels);
    frame.palette = Some(image.palette.clone());
    frame.delay = delay;
    frame.dispose = gif::DisposalMethod::Any;
    frame
}

/// Streams an animated GIF: the header and logical screen descriptor are
/// derived from the first frame to arrive, every later frame is written as
/// its own image block, and closing the channel writes the trailer. An error
/// item aborts the encode without a trailer so a truncated body is
/// distinguishable from a finished one. Never holds more than the one frame
/// it is writing.
pub async fn encode_animated<W: Write>(sink: W, mut frames: Receiver<FrameResult>) -> Result<()> {
    let mut sink = Some(AbortableSink::new(sink));
    let mut encoder: Option<gif::Encoder<AbortableSink<W>>> = None;
    let mut screen = (0u16, 0u16);

    while let Some(item) = frames.recv().await {
        let frame = match item {
            Ok(frame) => frame,
            Err(err) => {
                if let Some(encoder) = encoder.as_mut() {
                    encoder.get_mut().disarm();
                }
                return Err(err);
            }
        };

        if encoder.is_none() {
            let writer = match sink.take() {
                Some(writer) => writer,
                None => bail!("encoder initialised twice"),
            };
            screen = (frame.image.width, frame.image.height);
            let mut new_encoder = gif::Encoder::new(writer, screen.0, screen.1, &[])?;
            // loop forever once the animation finishes
            new_encoder.set_repeat(gif::Repeat::Infinite)?;
            encoder = Some(new_encoder);
        }

        let Some(encoder) = encoder.as_mut() else {
            bail!("encoder missing after initialisation");
        };

        if (frame.image.width, frame.image.height) != screen {
            encoder.get_mut().disarm();
            bail!(
                "frame {} is {}x{}, expected {}x{}",
                frame.frame_num,
                frame.image.width,
                frame.image.height,
                screen.0,
                screen.1
            );
        }

        encoder.write_frame(&frame_to_gif_frame(&frame.image, frame.delay))?;
    }

    // dropping the encoder writes the trailer
    match encoder {
        Some(_) => Ok(()),
        None => bail!("no frames were produced"),
    }
}

/// Encodes a single frame as a non-looping GIF.
pub fn encode_frame<W: Write>(sink: W, image: &PalettedImage) -> Result<()> {
    let mut encoder = gif::Encoder::new(sink, image.width, image.height, &[])?;
    encoder.write_frame(&frame_to_gif_frame(image, 0))?;
    Ok(())
}

/// Per-request animation parameters.
#[derive(Debug, Clone, Copy)]
pub struct AnimationOptions {
    pub frame_delay: u16,
    pub loop_delay: u16,
    pub width: i32,
    pub height: i32,
}

impl Default for AnimationOptions {
    fn default() -> Self {
        AnimationOptions {
            frame_delay: GIF_FRAME_DELAY,
            loop_delay: GIF_LOOP_DELAY,
            width: 0,
            height: 0,
        }
    }
}

/// Renders a frame sequence to `sink` as an animated GIF. A producer task
/// rasterises and quantises frames in order while the encoder drains the
/// capacity-1 channel on this task, so production never outruns the sink by
/// more than one frame.
pub async fn render_animated<W: Write>(
    sink: W,
    renderer: Arc<BoardRenderer>,
    game: Game,
    frames: Vec<GameFrame>,
    options: AnimationOptions,
) -> Result<()> {
    let (tx, rx) = tokio::sync::mpsc::channel::<FrameResult>(1);

    let producer = tokio::spawn(async move {
        let sender = tx.clone();
        drive_producer(
            tx,
            produce_frames(sender, renderer, game, frames, options),
        )
        .await;
    });

    let result = encode_animated(sink, rx).await;
    let _ = producer.await;
    result
}

/// Renders one frame as a single-image GIF, skipping the channel machinery.
pub async fn render_frame<W: Write>(
    sink: W,
    renderer: &BoardRenderer,
    game: &Game,
    frame: &GameFrame,
    width: i32,
    height: i32,
) -> Result<()> {
    let board = Board::from_game_frame(game, frame);
    let image = renderer.draw(&board, width, height).await?;
    encode_frame(sink, &quantize(&image))
}

/// Runs a producer future, translating both its error and any panic into an
/// error item on the channel so the consumer always observes the failure
/// instead of a silently closed channel.
async fn drive_producer(
    tx: Sender<FrameResult>,
    producer: impl std::future::Future<Output = Result<()>>,
) {
    match AssertUnwindSafe(producer).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            let _ = tx.send(Err(err)).await;
        }
        Err(panic) => {
            let _ = tx
                .send(Err(anyhow!("render panicked: {}", panic_message(&*panic))))
                .await;
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn produce_frames(
    tx: Sender<FrameResult>,
    renderer: Arc<BoardRenderer>,
    game: Game,
    frames: Vec<GameFrame>,
    options: AnimationOptions,
) -> Result<()> {
    let start = Instant::now();
    let total = frames.len();
    let frame_delay = if total <= SHORT_RANGE_FRAMES {
        options.frame_delay.max(SHORT_RANGE_FRAME_DELAY)
    } else {
        options.frame_delay
    };

    for (i, game_frame) in frames.iter().enumerate() {
        let delay = if i + 1 == total {
            options.loop_delay
        } else {
            frame_delay
        };

        let board = Board::from_game_frame(&game, game_frame);
        let canvas = renderer.draw(&board, options.width, options.height).await?;
        let frame = GifFrame {
            image: quantize(&canvas),
            frame_num: i,
            delay,
        };

        if tx.send(Ok(frame)).await.is_err() {
            debug!(game = %game.id, "consumer went away, stopping frame production");
            return Ok(());
        }
    }

    let elapsed = start.elapsed();
    let fps = if elapsed.as_secs_f64() > 0.0 {
        total as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    info!(game = %game.id, duration = ?elapsed, fps = fps, "GIF render complete");

    Ok(())
}
