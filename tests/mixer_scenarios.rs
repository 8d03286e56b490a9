use approx::assert_abs_diff_eq;
use speechoke::audio::{AmbientMixer, AudioConfig, MixMode, NullOutput, UserGesture};

const SR: u32 = 8000;

fn mixer() -> AmbientMixer {
    let config = AudioConfig {
        sample_rate: SR,
        step_ms: 5,
        ..AudioConfig::default()
    };
    AmbientMixer::new(config, Box::new(NullOutput::new()))
}

fn render_seconds(mixer: &AmbientMixer, seconds: f32) {
    let mut block = vec![0.0; (SR as f32 * seconds) as usize];
    mixer.with_graph(|g| g.render(&mut block)).unwrap();
}

#[test]
fn ambient_fades_in_with_the_time_constant() {
    let mut mixer = mixer();
    mixer.set_mode(MixMode::Ambient);
    mixer.set_volume(0.5);
    mixer.on_user_gesture(UserGesture::observed()).unwrap();

    render_seconds(&mixer, 0.5);
    let (ambient, tension) = mixer.with_graph(|g| g.bus_gains()).unwrap();
    // One time constant: 1 - 1/e of the way to 0.05.
    assert_abs_diff_eq!(ambient, 0.05 * (1.0 - (-1.0f32).exp()), epsilon = 1e-3);
    assert_eq!(tension, 0.0);

    render_seconds(&mixer, 4.5);
    let (ambient, _) = mixer.with_graph(|g| g.bus_gains()).unwrap();
    assert_abs_diff_eq!(ambient, 0.05, epsilon = 1e-4);
    mixer.teardown();
}

#[test]
fn switching_beds_crossfades() {
    let mut mixer = mixer();
    mixer.on_user_gesture(UserGesture::observed()).unwrap();
    mixer.set_mode(MixMode::Ambient);
    mixer.set_volume(1.0);
    render_seconds(&mixer, 5.0);

    mixer.set_mode(MixMode::Tension);
    render_seconds(&mixer, 5.0);
    let (ambient, tension) = mixer.with_graph(|g| g.bus_gains()).unwrap();
    assert!(ambient < 1e-3, "ambient still at {ambient}");
    assert_abs_diff_eq!(tension, 0.15, epsilon = 1e-3);

    mixer.set_mode(MixMode::Off);
    render_seconds(&mixer, 5.0);
    let (ambient, tension) = mixer.with_graph(|g| g.bus_gains()).unwrap();
    assert!(ambient < 1e-3 && tension < 1e-3);
    mixer.teardown();
}

#[test]
fn rendered_output_stays_in_range() {
    let mut mixer = mixer();
    mixer.set_mode(MixMode::Tension);
    mixer.set_volume(1.0);
    mixer.on_user_gesture(UserGesture::observed()).unwrap();
    let mut block = vec![0.0; SR as usize * 2];
    mixer.with_graph(|g| g.render(&mut block)).unwrap();
    assert!(block.iter().all(|s| s.is_finite() && s.abs() <= 1.0));
    assert!(block.iter().any(|s| s.abs() > 0.0));
    mixer.teardown();
}
