//! Bevy front end: the teleprompter window and the per-frame loops.
//!
//! Audio and microphone handles are `!Send`, so the mixer and the running
//! performance live in non-send resources and their systems run on the main
//! thread.

use std::sync::Arc;

use bevy::app::AppExit;
use bevy::prelude::*;
use bevy::sprite::Anchor;
use bevy::text::{TextBounds, TextLayoutInfo};
use bevy::window::PrimaryWindow;
use crossbeam_channel::{Receiver, TryRecvError};

use crate::audio::{AmbientMixer, NullOutput, OutputBackend, RodioOutput, UserGesture};
use crate::capture::Microphone;
use crate::config::Config;
use crate::critique::{spawn_critique, CritiqueRequest, CritiqueResult, CritiqueService};
use crate::script::Script;
use crate::session::PerformanceSession;
use crate::settings::UserSettings;
use crate::teleprompter::{glow_radius, paragraphs, ScrollAnimator};

/// #00ffa3
const ACCENT: Color = Color::srgb(0.0, 1.0, 0.64);
const VOLUME_STEP: f32 = 0.1;
const SPEED_STEP: f32 = 0.25;
const TEXT_WIDTH: f32 = 900.0;
const BAR_COUNT: usize = 64;
/// Blank space above and below the script, as a share of the window height.
const PADDING: f32 = 0.2;

#[derive(States, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Stage {
    #[default]
    Prepare,
    Perform,
    Critique,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Prepare => "PREPARE",
            Stage::Perform => "PERFORM",
            Stage::Critique => "CRITIQUE",
        }
    }
}

#[derive(Resource)]
pub struct SpeechokeConfig(pub Config);

#[derive(Resource)]
pub struct Settings(pub UserSettings);

#[derive(Resource)]
pub struct CurrentScript(pub Script);

#[derive(Resource)]
pub struct Teleprompter(pub ScrollAnimator);

/// Smoothed microphone level of the current frame.
#[derive(Resource, Default)]
pub struct InputLevel(pub f32);

/// Last message for the performer.
#[derive(Resource, Default)]
pub struct StatusLine(pub String);

#[derive(Resource)]
pub struct CritiqueBackend(pub Arc<dyn CritiqueService + Send + Sync>);

#[derive(Resource, Default)]
pub struct CritiqueInbox {
    pending: Option<Receiver<CritiqueResult>>,
    pub latest: Option<CritiqueResult>,
}

impl CritiqueInbox {
    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    /// Wait for the critique of a new take.
    pub fn expect(&mut self, receiver: Receiver<CritiqueResult>) {
        self.pending = Some(receiver);
        self.latest = None;
    }

    /// Forget the previous take: its scorecard and any critique still in
    /// flight for it.
    pub fn clear(&mut self) {
        self.pending = None;
        self.latest = None;
    }

    /// Take a delivered critique, if one has arrived. A worker that went
    /// away without answering yields the fallback.
    pub fn poll(&mut self) -> Option<&CritiqueResult> {
        let received = match self.pending.as_ref().map(|rx| rx.try_recv()) {
            None | Some(Err(TryRecvError::Empty)) => return None,
            Some(Ok(result)) => result,
            Some(Err(TryRecvError::Disconnected)) => CritiqueResult::fallback(),
        };
        self.pending = None;
        self.latest = Some(received);
        self.latest.as_ref()
    }
}

/// Non-send: holds the output stream once audio is unlocked.
pub struct MixerSlot(Option<AmbientMixer>);

/// Non-send: holds the microphone stream while performing.
#[derive(Default)]
pub struct ActiveSession(Option<PerformanceSession>);

#[derive(Component)]
struct ScriptText;

#[derive(Component)]
struct StatusText;

#[derive(Component)]
struct VisualizerBar(usize);

/// Upper-cased paragraphs with wide gaps, the way the prompter shows them.
pub fn display_text(script: &Script) -> String {
    paragraphs(&script.text)
        .iter()
        .map(|p| p.trim().to_uppercase())
        .collect::<Vec<_>>()
        .join("\n\n\n")
}

pub struct SpeechokePlugin {
    pub config: Config,
    pub script: Script,
    pub critic: Arc<dyn CritiqueService + Send + Sync>,
    /// Render the beds into a null output instead of the sound card.
    pub mute: bool,
}

impl Plugin for SpeechokePlugin {
    fn build(&self, app: &mut App) {
        let output: Box<dyn OutputBackend> = if self.mute {
            Box::new(NullOutput::new())
        } else {
            Box::new(RodioOutput::new())
        };
        let settings = UserSettings::from_config(&self.config);
        let mut mixer = AmbientMixer::new(self.config.audio.clone(), output);
        mixer.set_volume(settings.volume);
        mixer.set_mode(settings.mix_mode(false));
        let mut animator = ScrollAnimator::new(self.config.teleprompter.clone());
        animator.set_speed(settings.speed);

        app.init_state::<Stage>()
            .insert_resource(SpeechokeConfig(self.config.clone()))
            .insert_resource(Settings(settings))
            .insert_resource(CurrentScript(self.script.clone()))
            .insert_resource(Teleprompter(animator))
            .insert_resource(CritiqueBackend(Arc::clone(&self.critic)))
            .init_resource::<InputLevel>()
            .init_resource::<StatusLine>()
            .init_resource::<CritiqueInbox>()
            .insert_non_send_resource(MixerSlot(Some(mixer)))
            .insert_non_send_resource(ActiveSession::default())
            .add_systems(Startup, setup_scene)
            .add_systems(
                Update,
                (
                    unlock_audio_on_gesture,
                    handle_controls.after(unlock_audio_on_gesture),
                    sync_mix.after(handle_controls),
                    reset_scroll_on_script_change,
                    scroll_script.after(reset_scroll_on_script_change),
                    collect_critique,
                    refresh_status.after(collect_critique),
                    teardown_on_exit,
                ),
            )
            .add_systems(
                Update,
                (sample_input_level, draw_visualizer.after(sample_input_level))
                    .run_if(in_state(Stage::Perform)),
            )
            .add_systems(OnEnter(Stage::Perform), start_scrolling)
            .add_systems(OnExit(Stage::Perform), leave_performance);
    }
}

fn setup_scene(mut commands: Commands, script: Res<CurrentScript>) {
    commands.spawn(Camera2d);

    commands.spawn((
        Text2d::new(display_text(&script.0)),
        TextFont {
            font_size: 42.0,
            ..default()
        },
        TextColor(Color::WHITE),
        TextLayout::new_with_justify(JustifyText::Center),
        TextBounds::new_horizontal(TEXT_WIDTH),
        Anchor::TopCenter,
        ScriptText,
    ));

    commands.spawn((
        Text::new(""),
        TextFont {
            font_size: 16.0,
            ..default()
        },
        TextColor(ACCENT),
        Node {
            position_type: PositionType::Absolute,
            top: Val::Px(8.0),
            left: Val::Px(8.0),
            ..default()
        },
        StatusText,
    ));

    commands
        .spawn(Node {
            position_type: PositionType::Absolute,
            bottom: Val::Px(0.0),
            left: Val::Px(0.0),
            width: Val::Percent(100.0),
            height: Val::Px(80.0),
            align_items: AlignItems::FlexEnd,
            ..default()
        })
        .with_children(|parent| {
            for i in 0..BAR_COUNT {
                parent.spawn((
                    Node {
                        flex_grow: 1.0,
                        height: Val::Percent(0.0),
                        margin: UiRect::horizontal(Val::Px(1.0)),
                        ..default()
                    },
                    BackgroundColor(ACCENT),
                    VisualizerBar(i),
                ));
            }
        });
}

/// Any key or click counts as the gesture that unlocks audio output.
fn unlock_audio_on_gesture(
    keys: Res<ButtonInput<KeyCode>>,
    mouse: Res<ButtonInput<MouseButton>>,
    mut mixer: NonSendMut<MixerSlot>,
    mut status: ResMut<StatusLine>,
) {
    if keys.get_just_pressed().next().is_none() && mouse.get_just_pressed().next().is_none() {
        return;
    }
    let Some(mixer) = mixer.0.as_mut() else {
        return;
    };
    if let Err(err) = mixer.on_user_gesture(UserGesture::observed()) {
        log::error!("[speechoke][audio] could not unlock audio: {err}");
        status.0 = format!("Audio unavailable: {err}");
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_controls(
    keys: Res<ButtonInput<KeyCode>>,
    stage: Res<State<Stage>>,
    mut next_stage: ResMut<NextState<Stage>>,
    config: Res<SpeechokeConfig>,
    script: Res<CurrentScript>,
    backend: Res<CritiqueBackend>,
    mut settings: ResMut<Settings>,
    mut teleprompter: ResMut<Teleprompter>,
    mut inbox: ResMut<CritiqueInbox>,
    mut status: ResMut<StatusLine>,
    mut session: NonSendMut<ActiveSession>,
    mut mixer: NonSendMut<MixerSlot>,
) {
    if keys.just_pressed(KeyCode::Space) {
        match stage.get() {
            Stage::Prepare | Stage::Critique => {
                match PerformanceSession::begin(&config.0.analysis, Microphone::acquire) {
                    Ok(mut performance) => {
                        performance.start_recording();
                        session.0 = Some(performance);
                        inbox.clear();
                        status.0 = "Recording. SPACE to finish.".into();
                        next_stage.set(Stage::Perform);
                    }
                    Err(err) => {
                        log::error!("[speechoke][capture] error accessing microphone: {err}");
                        status.0 = "Microphone access is required to perform.".into();
                    }
                }
            }
            Stage::Perform => {
                if let Some(mut performance) = session.0.take() {
                    match performance.finish() {
                        Ok(Some(take)) => {
                            let request = CritiqueRequest::new(&script.0.title, &script.0.text, &take);
                            inbox.expect(spawn_critique(Arc::clone(&backend.0), request));
                            status.0 = format!("Judging a {:.1}s take...", take.duration().as_secs_f32());
                        }
                        Ok(None) => {}
                        Err(err) => {
                            log::error!("[speechoke][capture] could not finalize take: {err}");
                            inbox.latest = Some(CritiqueResult::fallback());
                        }
                    }
                }
                next_stage.set(Stage::Critique);
            }
        }
    }

    if keys.just_pressed(KeyCode::ArrowUp) {
        settings.0.nudge_volume(VOLUME_STEP);
    }
    if keys.just_pressed(KeyCode::ArrowDown) {
        settings.0.nudge_volume(-VOLUME_STEP);
    }
    if keys.just_pressed(KeyCode::Equal) {
        settings.0.nudge_speed(SPEED_STEP);
        teleprompter.0.set_speed(settings.0.speed);
    }
    if keys.just_pressed(KeyCode::Minus) {
        settings.0.nudge_speed(-SPEED_STEP);
        teleprompter.0.set_speed(settings.0.speed);
    }
    if keys.just_pressed(KeyCode::KeyA) {
        settings.0.ambience = !settings.0.ambience;
    }
    if keys.just_pressed(KeyCode::KeyP) && *stage.get() == Stage::Perform {
        if teleprompter.0.is_playing() {
            teleprompter.0.pause();
        } else {
            teleprompter.0.play();
        }
    }
    if keys.just_pressed(KeyCode::KeyR) {
        teleprompter.0.set_text();
    }
    if keys.just_pressed(KeyCode::KeyM) {
        if let Some(mixer) = mixer.0.as_mut() {
            mixer.play_cue();
        }
    }
}

/// Push the current stage and settings to the mixer; unchanged values are
/// ignored by the mixer itself.
fn sync_mix(stage: Res<State<Stage>>, settings: Res<Settings>, mut mixer: NonSendMut<MixerSlot>) {
    let Some(mixer) = mixer.0.as_mut() else {
        return;
    };
    mixer.set_volume(settings.0.volume);
    mixer.set_mode(settings.0.mix_mode(*stage.get() == Stage::Perform));
}

fn reset_scroll_on_script_change(
    script: Res<CurrentScript>,
    mut teleprompter: ResMut<Teleprompter>,
    mut texts: Query<&mut Text2d, With<ScriptText>>,
) {
    if !script.is_changed() {
        return;
    }
    teleprompter.0.set_text();
    for mut text in &mut texts {
        text.0 = display_text(&script.0);
    }
}

/// Every take starts with the script at the top.
fn start_scrolling(mut teleprompter: ResMut<Teleprompter>) {
    teleprompter.0.restart();
}

fn leave_performance(
    mut teleprompter: ResMut<Teleprompter>,
    mut level: ResMut<InputLevel>,
    mut session: NonSendMut<ActiveSession>,
    mut bars: Query<&mut Node, With<VisualizerBar>>,
) {
    teleprompter.0.pause();
    level.0 = 0.0;
    if let Some(performance) = session.0.take() {
        performance.abort();
    }
    for mut node in &mut bars {
        node.height = Val::Percent(0.0);
    }
}

fn scroll_script(
    time: Res<Time>,
    level: Res<InputLevel>,
    mut teleprompter: ResMut<Teleprompter>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut texts: Query<(&TextLayoutInfo, &mut Transform, &mut TextColor), With<ScriptText>>,
) {
    let Ok(window) = windows.get_single() else {
        return;
    };
    let viewport = window.height();
    let scale = window.scale_factor().max(f32::EPSILON);
    for (layout, mut transform, mut color) in &mut texts {
        // Layout size is in physical pixels.
        let content = layout.size.y / scale + 2.0 * PADDING * viewport;
        let offset = teleprompter.0.frame(time.elapsed_secs_f64(), content, viewport);
        transform.translation.y = viewport / 2.0 - PADDING * viewport + offset;
        color.0 = match glow_radius(level.0) {
            Some(radius) => {
                let t = (radius / 10.0).min(1.0);
                Color::srgb(1.0 - t, 1.0, 1.0 - 0.36 * t)
            }
            None => Color::WHITE,
        };
    }
}

fn sample_input_level(mut session: NonSendMut<ActiveSession>, mut level: ResMut<InputLevel>) {
    level.0 = session.0.as_mut().map_or(0.0, |performance| performance.frame());
}

fn draw_visualizer(
    mut session: NonSendMut<ActiveSession>,
    mut bars: Query<(&VisualizerBar, &mut Node, &mut BackgroundColor)>,
) {
    let Some(performance) = session.0.as_mut() else {
        return;
    };
    let model = performance.bars();
    for (bar, mut node, mut background) in &mut bars {
        if let Some(b) = model.get(bar.0) {
            node.height = Val::Percent(b.fraction * 100.0);
            background.0 = Color::hsl(b.hue, 1.0, b.lightness / 100.0);
        }
    }
}

fn collect_critique(mut inbox: ResMut<CritiqueInbox>, mut status: ResMut<StatusLine>) {
    if let Some(result) = inbox.poll() {
        status.0 = format!("Score: {}/100", result.overall_score);
    }
}

#[allow(clippy::too_many_arguments)]
fn refresh_status(
    stage: Res<State<Stage>>,
    settings: Res<Settings>,
    teleprompter: Res<Teleprompter>,
    level: Res<InputLevel>,
    inbox: Res<CritiqueInbox>,
    status: Res<StatusLine>,
    mixer: NonSend<MixerSlot>,
    mut texts: Query<&mut Text, With<StatusText>>,
) {
    let stage = *stage.get();
    let mode = settings.0.mix_mode(stage == Stage::Perform);
    let audio = match mixer.0.as_ref() {
        Some(m) if m.is_audible() => "live",
        Some(m) if m.is_initialized() => "suspended",
        Some(_) => "locked (press any key)",
        None => "closed",
    };
    let mut lines = vec![
        format!(
            "[{}] SPACE perform/finish | UP/DOWN volume {:.0}% | +/- speed {:.2}x | P pause | R rewind | A ambience | M madness",
            stage.name(),
            settings.0.volume * 100.0,
            teleprompter.0.speed()
        ),
        format!(
            "bed: {} ({}) | audio: {} | mic: {:.2}",
            mode.name(),
            mode.description(),
            audio,
            level.0
        ),
    ];
    if !status.0.is_empty() {
        lines.push(status.0.clone());
    }
    if inbox.is_waiting() {
        lines.push("The judges are deliberating...".into());
    }
    if let Some(critique) = &inbox.latest {
        lines.push(format!(
            "OVERALL {} | clarity {} | emotion {} | pacing {}",
            critique.overall_score, critique.clarity_score, critique.emotion_score, critique.pacing_score
        ));
        lines.push(critique.feedback.clone());
        lines.push(format!("Best line: {}", critique.best_line));
        lines.push(format!("Tip: {}", critique.improvement_tip));
    }
    for mut text in &mut texts {
        text.0 = lines.join("\n");
    }
}

fn teardown_on_exit(
    mut exits: EventReader<AppExit>,
    mut mixer: NonSendMut<MixerSlot>,
    mut session: NonSendMut<ActiveSession>,
) {
    if exits.read().next().is_none() {
        return;
    }
    if let Some(performance) = session.0.take() {
        performance.abort();
    }
    if let Some(mixer) = mixer.0.take() {
        mixer.teardown();
    }
}
