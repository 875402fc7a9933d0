use std::sync::{Arc, Mutex};
use std::time::Duration;

use mission_terminal_core::audio::{
    HeadlessDevice, HeadlessPlatform, HeadlessSampleBank, SampleBehavior, Waveform,
};
use mission_terminal_core::render::{HeadlessElement, HeadlessSurface};
use mission_terminal_core::{
    scene, AudioConfig, AudioSystem, ChoreographyConfig, Choreographer, Clock, Element,
    ElementHandle, FallbackReason, Marker, MachineEvent, PlayOptions, PlaybackSource, SceneId,
    SceneStateMachine, Score, ScreenTransition, ScrollSurface, SequenceStep, SoundCatalog, Stage,
    StateChange, TokioClock, TransitionGraph,
};

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[tokio::test]
async fn invalid_edges_leave_the_machine_untouched() {
    let graph = TransitionGraph::new()
        .with_edges("A", &["B"])
        .with_edges("B", &["C", "D"]);
    let mut machine = SceneStateMachine::new("A", graph);

    assert!(!machine.transition("C", None).await);
    assert_eq!(machine.history(), vec![SceneId::from("A")]);

    assert!(machine.transition("B", None).await);
    assert_eq!(machine.history(), vec![SceneId::from("A"), SceneId::from("B")]);

    assert!(machine.transition("C", None).await);
    assert_eq!(
        machine.history(),
        vec![SceneId::from("A"), SceneId::from("B"), SceneId::from("C")]
    );
}

#[tokio::test(start_paused = true)]
async fn timed_out_sample_plays_synthesized_fallback() {
    let clock = TokioClock::new().shared();
    let device = HeadlessDevice::running();
    let bank = HeadlessSampleBank::new().with_behavior("audio/beep.mp3", SampleBehavior::Hang);
    let audio = AudioSystem::new(AudioConfig::default(), SoundCatalog::mission(), clock.clone())
        .with_platform(Arc::new(HeadlessPlatform::new(device.clone())))
        .with_samples(Arc::new(bank.clone()));
    audio.init();

    let beep = audio.catalog().get("beep").unwrap();
    assert!(!beep.prefer_synthesized);

    let report = audio.preload().await;
    assert_eq!(report.timed_out, vec!["beep".to_string()]);
    assert_eq!(audio.sound_status("beep").unwrap().fallback, FallbackReason::Timeout);
    assert_eq!(clock.now(), AudioConfig::default().effect_timeout());

    let playback = audio.play("beep", PlayOptions::default()).await.unwrap();

    match playback.source {
        PlaybackSource::Synthesized(tone) => {
            assert_eq!(tone.waveform, Waveform::Square);
            assert_eq!(tone.frequency, 800.0);
        }
        other => panic!("expected synthesized beep, got {other:?}"),
    }
    assert!(bank.plays().iter().all(|(reference, _)| reference != "audio/beep.mp3"));
    assert_eq!(device.tones().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn pause_holds_typing_between_characters() {
    let clock = TokioClock::new().shared();
    let chor = Arc::new(Choreographer::new(
        ChoreographyConfig::default(),
        clock.clone(),
        Stage::new(),
    ));
    let line = Arc::new(HeadlessElement::new("line", clock.clone()));
    let handle: ElementHandle = line.clone();

    let typing = tokio::spawn({
        let chor = chor.clone();
        async move { chor.type_text(Some(&handle), "AB", ms(10)).await }
    });

    tokio::time::sleep(ms(5)).await;
    assert_eq!(line.text(), "A");
    chor.pause_animations();

    tokio::time::sleep(ms(500)).await;
    assert_eq!(line.text(), "A");

    chor.resume_animations();
    assert!(typing.await.unwrap());
    assert_eq!(line.text(), "AB");
}

#[tokio::test(start_paused = true)]
async fn choreographed_transition_runs_listeners_cues_and_routine() {
    let clock = TokioClock::new().shared();
    let device = HeadlessDevice::running();
    let audio = AudioSystem::new(AudioConfig::default(), SoundCatalog::mission(), clock.clone())
        .with_platform(Arc::new(HeadlessPlatform::new(device.clone())))
        .shared();
    audio.init();

    let wake_screen = Arc::new(HeadlessElement::new("wake", clock.clone()));
    let boot_screen = Arc::new(HeadlessElement::new("boot", clock.clone()));
    let status = Arc::new(HeadlessElement::new("status", clock.clone()));
    let container = Arc::new(HeadlessSurface::new("boot-container", clock.clone()));
    container.set_scroll_top(500.0);
    let stage = Stage::new()
        .with_screen(scene::WAKE, wake_screen.clone())
        .with_screen(scene::BOOT, boot_screen.clone())
        .with_container(scene::BOOT, container.clone());

    let typed = Arc::new(Mutex::new(String::new()));
    let sink = typed.clone();
    let chor = Choreographer::new(ChoreographyConfig::default(), clock.clone(), stage)
        .with_audio(audio.clone())
        .with_type_cue(move |unit| sink.lock().unwrap().push(unit));
    let status_handle: ElementHandle = status.clone();
    chor.register_routine(
        scene::BOOT,
        Score::new("boot")
            .then(SequenceStep::reveal(Some(status_handle.clone()), ms(400)))
            .then(SequenceStep::type_text(Some(status_handle), "OK GO", ms(20)).after(ms(100))),
    );

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut machine = SceneStateMachine::new(scene::WAKE, TransitionGraph::mission())
        .with_audio(audio.clone());
    for tag in ["first", "second"] {
        let order = order.clone();
        machine.on(
            MachineEvent::StateChange,
            Arc::new(move |change: &StateChange| -> mission_terminal_core::Result<()> {
                order.lock().unwrap().push(format!("{tag} {}>{}", change.from, change.to));
                Ok(())
            }),
        );
    }

    let transition: &dyn ScreenTransition = &chor;
    assert!(machine.transition(scene::BOOT, Some(transition)).await);

    assert_eq!(*order.lock().unwrap(), vec!["first wake>boot", "second wake>boot"]);
    assert!(boot_screen.has_marker(Marker::Active));
    assert!(wake_screen.has_marker(Marker::Hidden));
    assert_eq!(container.scroll_top(), 0.0);
    assert_eq!(status.reveal_times(), vec![ms(1_500)]);
    assert_eq!(status.text(), "OK GO");
    assert_eq!(*typed.lock().unwrap(), "OKGO");
    // fade out + fade in + settle + step delay + five characters
    assert_eq!(clock.now(), ms(1_500 + 100 + 5 * 20));
    assert_eq!(device.tones().len(), 2, "power_on and boot cues");
}

#[tokio::test(start_paused = true)]
async fn staggered_reveals_ignore_animation_length() {
    let clock = TokioClock::new().shared();
    let chor = Choreographer::new(ChoreographyConfig::default(), clock.clone(), Stage::new());
    let elements: Vec<Arc<HeadlessElement>> = (0..3)
        .map(|i| Arc::new(HeadlessElement::new(format!("row-{i}"), clock.clone())))
        .collect();
    let handles: Vec<Option<ElementHandle>> = elements
        .iter()
        .map(|element| -> Option<ElementHandle> { Some(element.clone()) })
        .collect();

    for duration in [ms(50), ms(5_000)] {
        let options = mission_terminal_core::RevealOptions {
            duration,
            ..mission_terminal_core::RevealOptions::staggered(ms(100))
        };
        let origin = clock.now();
        chor.reveal_sequence(&handles, options).await;

        let starts: Vec<_> = elements
            .iter()
            .map(|element| *element.reveal_times().last().unwrap() - origin)
            .collect();
        assert_eq!(starts, vec![ms(0), ms(100), ms(200)]);
    }
}
