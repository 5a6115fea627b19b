pub mod ascii;
pub mod avatar;
pub mod gif;
pub mod image;
pub mod quantize;

pub use ascii::render_ascii;
pub use avatar::{avatar_svg, AvatarSettings, InvalidAvatarSettings};
pub use gif::{render_animated, render_frame, AnimationOptions, GIF_FRAME_DELAY, GIF_LOOP_DELAY};
pub use image::{BoardLayout, BoardRenderer, BOARD_BORDER, DEFAULT_SQUARE_SIZE};
pub use quantize::{quantize, PalettedImage};
