use std::rc::Rc;

use stitch_pip::capability::{Capability, PipCapabilities};
use stitch_pip::config::{Config, ConfigBuilder};
use stitch_pip::dom::{DomTree, MediaSnapshot, NodeId, Rect};
use stitch_pip::overlay::OverlayKind;
use stitch_pip::pip::{PageEvent, PipState, PipStrategy};
use stitch_pip::router::{Command, CommandResponse, KeyInput, VideoCommand};
use stitch_pip::sim::{SimFrame, SimPage, SimPlatform};

fn playing_media() -> MediaSnapshot {
    MediaSnapshot {
        paused: false,
        current_time: 12.0,
        duration: Some(300.0),
        ready_state: 4,
        src: Some("talk.mp4".to_string()),
        ..MediaSnapshot::default()
    }
}

fn frame_with(title: &str, config: &Config, videos: &[MediaSnapshot]) -> (SimFrame, Vec<NodeId>) {
    let page = Rc::new(SimPage::new("https://video.example.com/watch?v=7", title));
    let nodes = videos
        .iter()
        .enumerate()
        .map(|(i, media)| {
            page.add_video(
                page.document(),
                Rect::new(0.0, i as f64 * 400.0, 640.0, 360.0),
                media.clone(),
            )
        })
        .collect();
    let platform = Rc::new(SimPlatform::new(
        page.clone(),
        PipCapabilities {
            document_pip: Capability::Available,
            native_pip: Capability::Available,
        },
    ));
    (SimFrame::new(0, page, platform, config), nodes)
}

fn frame() -> (SimFrame, NodeId) {
    let (frame, nodes) = frame_with("Talk", &Config::default(), &[playing_media()]);
    (frame, nodes[0])
}

fn toast(frame: &SimFrame) -> Option<String> {
    frame.context.overlays().current_toast()
}

async fn send_video(frame: &SimFrame, command: VideoCommand) -> CommandResponse {
    frame.command(Command::VideoCommand(command)).await
}

fn toggle() -> Command {
    Command::TogglePip {
        target_index: None,
        frame_id: None,
    }
}

#[tokio::test]
async fn test_speed_keys_walk_the_ladder() {
    let (frame, video) = frame();

    assert!(frame.key(&KeyInput::parse("shift+>")).await);
    assert_eq!(frame.page.media(video).unwrap().playback_rate, 1.25);
    assert_eq!(toast(&frame).as_deref(), Some("Speed: 1.25x ⏩"));

    for _ in 0..5 {
        frame.key(&KeyInput::parse("shift+>")).await;
    }
    assert_eq!(frame.page.media(video).unwrap().playback_rate, 2.0);

    frame.key(&KeyInput::parse("shift+<")).await;
    assert_eq!(frame.page.media(video).unwrap().playback_rate, 1.75);
    assert_eq!(toast(&frame).as_deref(), Some("Speed: 1.75x ⏪"));
}

#[tokio::test]
async fn test_keys_ignored_while_typing() {
    let (frame, video) = frame();
    frame.page.set_focus_editable(true);

    assert!(!frame.key(&KeyInput::parse("m")).await);
    assert!(!frame.page.media(video).unwrap().muted);

    // Keys from the PiP window are never text entry
    assert!(frame.key(&KeyInput::parse("pip:m")).await);
    assert!(frame.page.media(video).unwrap().muted);
}

#[tokio::test]
async fn test_unbound_keys_are_not_consumed() {
    let (frame, _) = frame();
    assert!(!frame.key(&KeyInput::parse("q")).await);
    assert!(!frame.key(&KeyInput::parse("alt+left")).await);
}

#[tokio::test]
async fn test_media_keys() {
    let (frame, video) = frame();

    frame.key(&KeyInput::parse("space")).await;
    assert!(frame.page.media(video).unwrap().paused);
    assert_eq!(toast(&frame).as_deref(), Some("Paused ⏸️"));
    frame.key(&KeyInput::parse("space")).await;
    assert_eq!(toast(&frame).as_deref(), Some("Playing ▶️"));

    frame.key(&KeyInput::parse("m")).await;
    assert_eq!(toast(&frame).as_deref(), Some("Muted 🔇"));
    frame.key(&KeyInput::parse("m")).await;
    assert_eq!(toast(&frame).as_deref(), Some("Unmuted 🔊"));

    frame.key(&KeyInput::parse("left")).await;
    assert_eq!(frame.page.media(video).unwrap().current_time, 7.0);
    assert_eq!(toast(&frame).as_deref(), Some("Rewind 5s ⏪"));
    frame.key(&KeyInput::parse("left")).await;
    frame.key(&KeyInput::parse("left")).await;
    assert_eq!(frame.page.media(video).unwrap().current_time, 0.0);

    frame.page.update_media(video, |media| media.current_time = 298.0);
    frame.key(&KeyInput::parse("right")).await;
    assert_eq!(frame.page.media(video).unwrap().current_time, 300.0);
}

#[tokio::test]
async fn test_volume_keys_clamp() {
    let (frame, video) = frame();

    frame.key(&KeyInput::parse("alt+up")).await;
    assert_eq!(frame.page.media(video).unwrap().volume, 1.0);
    assert_eq!(toast(&frame).as_deref(), Some("Volume: 100% 🔊"));

    frame.key(&KeyInput::parse("alt+down")).await;
    frame.key(&KeyInput::parse("alt+down")).await;
    assert!((frame.page.media(video).unwrap().volume - 0.8).abs() < 1e-9);
    assert_eq!(toast(&frame).as_deref(), Some("Volume: 80% 🔉"));

    for _ in 0..12 {
        frame.key(&KeyInput::parse("alt+down")).await;
    }
    assert_eq!(frame.page.media(video).unwrap().volume, 0.0);
    assert_eq!(toast(&frame).as_deref(), Some("Volume: 0% 🔇"));
}

#[tokio::test]
async fn test_help_key_toggles_panel() {
    let (frame, _) = frame();
    frame.key(&KeyInput::parse("h")).await;
    assert!(frame.context.overlays().help_visible());
    assert_eq!(frame.host.of_kind(OverlayKind::Help).len(), 1);

    frame.key(&KeyInput::parse("h")).await;
    assert!(!frame.context.overlays().help_visible());
    assert!(frame.host.of_kind(OverlayKind::Help).is_empty());
}

#[tokio::test]
async fn test_pip_keys() {
    let (frame, _) = frame();

    frame.key(&KeyInput::parse("alt+p")).await;
    assert_eq!(frame.context.state(), PipState::DocumentActive);

    assert!(frame.key(&KeyInput::parse("pip:alt+=")).await);
    assert!(frame.key(&KeyInput::parse("pip:alt+right")).await);
    let (_, window) = frame.platform.open_window().unwrap();
    assert_eq!(window.size.width, 420);
    assert_eq!(window.position, (20, 0));

    frame.key(&KeyInput::parse("pip:alt+x")).await;
    assert_eq!(frame.context.state(), PipState::Idle);
}

#[tokio::test]
async fn test_video_commands() {
    let (frame, video) = frame();
    assert_eq!(send_video(&frame, VideoCommand::Seek { pct: 0.5 }).await, CommandResponse::Applied);
    assert_eq!(frame.page.media(video).unwrap().current_time, 150.0);

    send_video(&frame, VideoCommand::SeekRelative { delta: -200.0 }).await;
    assert_eq!(frame.page.media(video).unwrap().current_time, 0.0);

    send_video(&frame, VideoCommand::SetSpeed { speed: 100.0 }).await;
    assert_eq!(frame.page.media(video).unwrap().playback_rate, 16.0);
    send_video(&frame, VideoCommand::SetSpeed { speed: -1.0 }).await;
    assert_eq!(frame.page.media(video).unwrap().playback_rate, 16.0);

    send_video(&frame, VideoCommand::ToggleMute).await;
    assert!(frame.page.media(video).unwrap().muted);
    send_video(&frame, VideoCommand::SetVolume { volume: 1.5 }).await;
    let media = frame.page.media(video).unwrap();
    assert_eq!(media.volume, 1.0);
    assert!(!media.muted);

    send_video(&frame, VideoCommand::ToggleLoop).await;
    assert!(frame.page.media(video).unwrap().looping);
    assert_eq!(toast(&frame).as_deref(), Some("Loop: ON 🔁"));

    send_video(&frame, VideoCommand::TogglePlayPause).await;
    assert!(frame.page.media(video).unwrap().paused);
}

#[tokio::test]
async fn test_video_command_without_video_fails() {
    let (frame, _) = frame_with("Empty", &Config::default(), &[]);

    let response = frame.command(Command::VideoCommand(VideoCommand::ToggleMute)).await;
    assert_eq!(
        response,
        CommandResponse::Failed {
            message: "No video found".to_string()
        }
    );
    assert_eq!(toast(&frame).as_deref(), Some("No video found 🚫"));
    assert_eq!(
        frame.command(Command::GetVideoMetadata).await,
        CommandResponse::Metadata { metadata: None }
    );
}

#[tokio::test]
async fn test_metadata_cleans_title() {
    let (frame, _) = frame_with("Rust Async [1080p] (Part 2) ", &Config::default(), &[playing_media()]);

    let CommandResponse::Metadata { metadata: Some(metadata) } = frame.command(Command::GetVideoMetadata).await else {
        panic!("expected metadata");
    };
    assert_eq!(metadata.title, "Rust Async");
    assert_eq!(metadata.url, "https://video.example.com/watch?v=7");
    assert_eq!(metadata.duration, Some(300.0));
    assert_eq!(metadata.current_time, 12.0);

    let (frame, _) = frame_with("abp-123 Some Title", &Config::default(), &[playing_media()]);
    assert_eq!(frame.context.router().metadata().unwrap().title, "ABP-123");
}

#[tokio::test]
async fn test_toggle_targets() {
    let paused = MediaSnapshot {
        paused: true,
        ..playing_media()
    };
    let (frame, nodes) = frame_with("Two", &Config::default(), &[playing_media(), paused]);

    let response = frame
        .command(Command::TogglePip {
            target_index: Some(1),
            frame_id: None,
        })
        .await;
    assert_eq!(response, CommandResponse::State { state: PipState::DocumentActive });
    assert_eq!(frame.context.manager().bound_video(), Some(nodes[1]));
    frame.command(toggle()).await;

    let response = frame
        .command(Command::TogglePip {
            target_index: Some(5),
            frame_id: None,
        })
        .await;
    assert_eq!(
        response,
        CommandResponse::Failed {
            message: "Invalid video target: 5".to_string()
        }
    );

    let response = frame
        .context
        .handle_command(Command::TogglePip {
            target_index: None,
            frame_id: Some(3),
        })
        .await;
    assert_eq!(response, CommandResponse::Ignored);
    assert_eq!(frame.context.state(), PipState::Idle);
}

#[tokio::test]
async fn test_blocklisted_site() {
    let config = ConfigBuilder::new()
        .block_site("https://Video.Example.com/")
        .with_auto_pip(true)
        .build();
    let (frame, nodes) = frame_with("Talk", &config, &[playing_media()]);

    let response = frame.command(toggle()).await;
    assert!(matches!(response, CommandResponse::Failed { .. }));
    assert_eq!(toast(&frame).as_deref(), Some("PiP disabled on this site 🚫"));
    assert!(frame.platform.attempts().is_empty());

    frame.context.handle_event(PageEvent::VisibilityChanged { hidden: true }).await;
    assert_eq!(frame.context.state(), PipState::Idle);

    // Plain media commands still work
    frame.command(Command::VideoCommand(VideoCommand::ToggleMute)).await;
    assert!(frame.page.media(nodes[0]).unwrap().muted);
}

#[tokio::test]
async fn test_auto_pip_round_trip() {
    let config = ConfigBuilder::new().with_auto_pip(true).build();
    let (frame, _) = frame_with("Talk", &config, &[playing_media()]);

    frame.context.handle_event(PageEvent::VisibilityChanged { hidden: true }).await;
    assert_eq!(frame.context.state(), PipState::NativeActive);
    assert_eq!(frame.platform.attempts(), vec![PipStrategy::Native]);

    frame.context.handle_event(PageEvent::VisibilityChanged { hidden: false }).await;
    assert_eq!(frame.context.state(), PipState::Idle);
}

#[tokio::test]
async fn test_auto_pip_leaves_manual_sessions_alone() {
    let config = ConfigBuilder::new().with_auto_pip(true).build();
    let (frame, _) = frame_with("Talk", &config, &[playing_media()]);

    frame.command(toggle()).await;
    frame.context.handle_event(PageEvent::VisibilityChanged { hidden: true }).await;
    frame.context.handle_event(PageEvent::VisibilityChanged { hidden: false }).await;
    assert_eq!(frame.context.state(), PipState::DocumentActive);
    assert_eq!(frame.platform.attempts(), vec![PipStrategy::Document]);
}

#[tokio::test]
async fn test_auto_pip_needs_real_playback() {
    let config = ConfigBuilder::new().with_auto_pip(true).build();
    let short = MediaSnapshot {
        duration: Some(8.0),
        ..playing_media()
    };
    let (frame, _) = frame_with("Clip", &config, &[short]);
    frame.context.handle_event(PageEvent::VisibilityChanged { hidden: true }).await;
    assert_eq!(frame.context.state(), PipState::Idle);

    let (frame, _) = frame_with("Talk", &Config::default(), &[playing_media()]);
    frame.context.handle_event(PageEvent::VisibilityChanged { hidden: true }).await;
    assert_eq!(frame.context.state(), PipState::Idle);
}

#[tokio::test]
async fn test_page_unload_closes_session() {
    let (frame, _) = frame();
    frame.command(toggle()).await;
    frame.context.handle_event(PageEvent::PageUnload).await;
    assert_eq!(frame.context.state(), PipState::Idle);
    assert_eq!(frame.platform.open_surfaces(), 0);
}

const SRT: &str = "1\n00:00:10,000 --> 00:00:15,000\nHello there\n\n2\n00:00:20,000 --> 00:00:22,000\nGeneral Kenobi\n";

fn caption(frame: &SimFrame) -> Option<String> {
    frame
        .host
        .of_kind(OverlayKind::Caption)
        .first()
        .map(|view| view.text.clone())
}

#[tokio::test]
async fn test_subtitle_injection_and_sync() {
    let (frame, _) = frame();

    let response = frame
        .command(Command::InjectSubtitle {
            content: SRT.to_string(),
        })
        .await;
    assert_eq!(response, CommandResponse::Subtitles { cues: 2 });
    assert_eq!(caption(&frame).as_deref(), Some("Hello there"));

    frame.command(Command::AdjustSubtitleSync { seconds: 5.0 }).await;
    assert_eq!(toast(&frame).as_deref(), Some("Sync: +5s"));
    assert_eq!(caption(&frame), None);

    frame
        .context
        .handle_event(PageEvent::TimeUpdate {
            video: NodeId(1),
            current_time: 26.0,
        })
        .await;
    assert_eq!(caption(&frame).as_deref(), Some("General Kenobi"));
}

#[tokio::test]
async fn test_live_subtitles_append_chunks() {
    let (frame, _) = frame();
    let chunk = "WEBVTT\n\n00:00.000 --> 00:04.000\nfirst chunk\n";

    frame
        .command(Command::UpdateAiSubtitles {
            content: chunk.to_string(),
            offset: 0.0,
        })
        .await;
    let response = frame
        .command(Command::UpdateAiSubtitles {
            content: chunk.replace("first", "second"),
            offset: 10.0,
        })
        .await;
    assert_eq!(response, CommandResponse::Subtitles { cues: 1 });
    assert_eq!(frame.context.router().subtitle_count(), 2);
    assert_eq!(caption(&frame).as_deref(), Some("second chunk"));
}
