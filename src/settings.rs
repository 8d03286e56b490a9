use crate::audio::MixMode;
use crate::config::Config;

impl MixMode {
    /// Get a description of the mode
    pub fn description(&self) -> &'static str {
        match self {
            MixMode::Off => "No backing track",
            MixMode::Ambient => "Low breathing drone",
            MixMode::Tension => "120 BPM pulse with bass, lead and pad",
        }
    }
}

// Values the performer changes while the app runs
#[derive(Debug, Clone, PartialEq)]
pub struct UserSettings {
    pub ambience: bool,
    pub volume: f32,
    pub speed: f32,
    min_speed: f32,
    max_speed: f32,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl UserSettings {
    pub fn from_config(config: &Config) -> Self {
        let mut settings = Self {
            ambience: config.ambience,
            volume: 0.0,
            speed: 0.0,
            min_speed: config.teleprompter.min_speed,
            max_speed: config.teleprompter.max_speed,
        };
        settings.set_volume(config.volume);
        settings.set_speed(config.teleprompter.default_speed);
        settings
    }

    pub fn to_config(&self) -> Config {
        let mut config = Config {
            volume: self.volume,
            ambience: self.ambience,
            ..Config::default()
        };
        config.teleprompter.default_speed = self.speed;
        config.teleprompter.min_speed = self.min_speed;
        config.teleprompter.max_speed = self.max_speed;
        config
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed.max(self.min_speed).min(self.max_speed);
    }

    pub fn nudge_volume(&mut self, delta: f32) {
        self.set_volume(self.volume + delta);
    }

    pub fn nudge_speed(&mut self, delta: f32) {
        self.set_speed(self.speed + delta);
    }

    /// The bed for a stage of the performance: the pulse while performing,
    /// the drone around it, nothing when ambience is switched off.
    pub fn mix_mode(&self, performing: bool) -> MixMode {
        match (self.ambience, performing) {
            (false, _) => MixMode::Off,
            (true, true) => MixMode::Tension,
            (true, false) => MixMode::Ambient,
        }
    }
}
