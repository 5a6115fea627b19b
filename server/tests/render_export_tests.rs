mod common;

use anyhow::Result;

use ::common::{GameFrame, Point, Snake};
use crate::common::{test_game, TestEnvironment, TestOptions};

fn test_snake(body: Vec<Point>) -> Snake {
    Snake {
        id: "snake-1".to_string(),
        name: "tester".to_string(),
        body,
        health: 90,
        death: None,
        color: "#3b194d".to_string(),
        head: "default".to_string(),
        tail: "default".to_string(),
    }
}

fn simple_frame(turn: i32) -> GameFrame {
    GameFrame {
        turn,
        food: vec![],
        snakes: vec![test_snake(vec![
            Point::new(0, 0),
            Point::new(0, 1),
            Point::new(1, 1),
        ])],
        hazards: vec![],
    }
}

fn decode_gif(bytes: &[u8]) -> (u16, u16, Vec<u16>) {
    let mut decoder = gif::DecodeOptions::new()
        .read_info(bytes)
        .expect("response should be a decodable GIF");
    let screen = (decoder.width(), decoder.height());
    let mut delays = Vec::new();
    while let Some(frame) = decoder.read_next_frame().expect("frame should decode") {
        delays.push(frame.delay);
    }
    (screen.0, screen.1, delays)
}

#[tokio::test]
async fn renders_ascii_frame() -> Result<()> {
    let env = TestEnvironment::start(TestOptions {
        frames: vec![simple_frame(0)],
        ..TestOptions::default()
    })
    .await?;

    let response = env.get("/games/test-game/frames/0/ascii").await?;
    assert_eq!(response.status(), 200);

    let expected = "-----\n\
                    |   |\n\
                    |OT |\n\
                    |H  |\n\
                    -----\n";
    assert_eq!(response.text().await?, expected);

    // the .txt spelling serves the same rendering
    let response = env.get("/games/test-game/frames/0.txt").await?;
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await?, expected);

    Ok(())
}

#[tokio::test]
async fn renders_single_frame_gif_at_default_size() -> Result<()> {
    let env = TestEnvironment::start(TestOptions {
        frames: vec![simple_frame(0)],
        ..TestOptions::default()
    })
    .await?;

    let response = env.get("/games/test-game/frames/0/gif").await?;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/gif"
    );

    let bytes = response.bytes().await?;
    assert_eq!(&bytes[..6], b"GIF89a");

    // 3x3 board at the default square size renders 64x64
    let (width, height, delays) = decode_gif(&bytes);
    assert_eq!((width, height), (64, 64));
    assert_eq!(delays.len(), 1);

    // the frame palette carries the background, empty-square and snake
    // colours exactly
    let mut decoder = gif::DecodeOptions::new().read_info(&bytes[..])?;
    let frame = decoder
        .read_next_frame()?
        .expect("one frame should decode");
    let palette = frame.palette.clone().expect("frame should carry a palette");
    let colors: Vec<&[u8]> = palette.chunks(3).collect();
    assert!(colors.contains(&&[0xff, 0xff, 0xff][..]), "white background");
    assert!(colors.contains(&&[0xf0, 0xf0, 0xf0][..]), "empty squares");
    assert!(colors.contains(&&[0x3b, 0x19, 0x4d][..]), "snake colour");

    Ok(())
}

#[tokio::test]
async fn renders_dimensioned_frame_gif() -> Result<()> {
    let env = TestEnvironment::start(TestOptions {
        frames: vec![simple_frame(0)],
        ..TestOptions::default()
    })
    .await?;

    let response = env.get("/games/test-game/frames/0/124x124.gif").await?;
    assert_eq!(response.status(), 200);
    let bytes = response.bytes().await?;
    let (width, height, _) = decode_gif(&bytes);
    assert_eq!((width, height), (124, 124));

    Ok(())
}

#[tokio::test]
async fn rejects_invalid_dimensions_with_the_valid_options() -> Result<()> {
    let env = TestEnvironment::start(TestOptions::default()).await?;

    let response = env.get("/games/test-game/frames/0/100x100.gif").await?;
    assert_eq!(response.status(), 400);
    assert_eq!(
        response.text().await?,
        "Dimensions 100x100 invalid - valid options are: 34x34, 64x64, 94x94, 124x124"
    );

    // over the resolution cap is rejected before talking to the engine
    let response = env.get("/games/test-game/frames/0/9999x9999.gif").await?;
    assert_eq!(response.status(), 400);

    Ok(())
}

#[tokio::test]
async fn renders_animated_gif_with_delay_policy() -> Result<()> {
    let frames: Vec<GameFrame> = (0..5).map(simple_frame).collect();
    let env = TestEnvironment::start(TestOptions {
        frames,
        ..TestOptions::default()
    })
    .await?;

    let response = env
        .get("/games/test-game/gif?frames=0-4&frameDelay=16&loopDelay=100")
        .await?;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/gif"
    );

    let bytes = response.bytes().await?;
    let (width, height, delays) = decode_gif(&bytes);
    assert_eq!((width, height), (64, 64));
    assert_eq!(delays, vec![16, 16, 16, 16, 100]);
    assert!(bytes
        .windows(b"NETSCAPE2.0".len())
        .any(|window| window == b"NETSCAPE2.0"));

    Ok(())
}

#[tokio::test]
async fn short_ranges_bump_the_default_frame_delay() -> Result<()> {
    let frames: Vec<GameFrame> = (0..3).map(simple_frame).collect();
    let env = TestEnvironment::start(TestOptions {
        frames,
        ..TestOptions::default()
    })
    .await?;

    let response = env.get("/games/test-game/gif").await?;
    assert_eq!(response.status(), 200);
    let bytes = response.bytes().await?;
    let (_, _, delays) = decode_gif(&bytes);
    assert_eq!(delays, vec![16, 16, 200]);

    Ok(())
}

#[tokio::test]
async fn rejects_malformed_frames_parameter() -> Result<()> {
    let env = TestEnvironment::start(TestOptions::default()).await?;

    let response = env.get("/games/test-game/gif?frames=zero-four").await?;
    assert_eq!(response.status(), 400);
    assert!(response.text().await?.contains("invalid frames parameter"));

    Ok(())
}

#[tokio::test]
async fn unknown_games_and_frames_are_404() -> Result<()> {
    let env = TestEnvironment::start(TestOptions {
        frames: vec![simple_frame(0)],
        ..TestOptions::default()
    })
    .await?;

    let response = env.get("/games/no-such-game/gif").await?;
    assert_eq!(response.status(), 404);

    // frame index beyond the recorded game
    let response = env.get("/games/test-game/frames/99/ascii").await?;
    assert_eq!(response.status(), 404);

    Ok(())
}

#[tokio::test]
async fn wrapped_and_dead_snakes_render() -> Result<()> {
    // one alive snake wrapped around the edge, one recently dead snake
    let mut dead = test_snake(vec![Point::new(5, 5), Point::new(5, 6), Point::new(5, 7)]);
    dead.id = "snake-2".to_string();
    dead.death = Some(::common::Death {
        cause: "wall-collision".to_string(),
        turn: 3,
    });

    let frame = GameFrame {
        turn: 9,
        food: vec![Point::new(2, 2)],
        snakes: vec![
            test_snake(vec![
                Point::new(0, 5),
                Point::new(10, 5),
                Point::new(10, 4),
                Point::new(10, 3),
            ]),
            dead,
        ],
        hazards: vec![Point::new(0, 0)],
    };

    let env = TestEnvironment::start(TestOptions {
        game: test_game(11, 11),
        frames: vec![frame],
        ..TestOptions::default()
    })
    .await?;

    let response = env.get("/games/test-game/frames/0/gif").await?;
    assert_eq!(response.status(), 200);
    let bytes = response.bytes().await?;
    let (width, height, delays) = decode_gif(&bytes);
    assert_eq!((width, height), (224, 224));
    assert_eq!(delays.len(), 1);

    Ok(())
}
