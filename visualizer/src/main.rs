use fpcore::data::Position;
use iced::{
    mouse, time,
    widget::{
        button,
        canvas::{self, Canvas, Frame, Geometry, Path, Stroke},
        column, row, scrollable, text, text_input, Column, Container,
    },
    Alignment, Color, Element, Length, Point, Rectangle, Renderer, Subscription, Task, Theme,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn main() -> iced::Result {
    iced::application(Visualizer::boot, Visualizer::update, Visualizer::view)
        .title(application_title)
        .subscription(application_subscription)
        .theme(application_theme)
        .run()
}

fn application_title(_: &Visualizer) -> String {
    "Fingerprint Positioning Visualizer".into()
}

fn application_subscription(_: &Visualizer) -> Subscription<Message> {
    time::every(Duration::from_secs(1)).map(|_| Message::Tick)
}

fn application_theme(_: &Visualizer) -> Theme {
    Theme::Dark
}

#[derive(Debug)]
struct Visualizer {
    config: ConfigForm,
    payload: Option<VisualizationPayload>,
    errors: Vec<f32>,
    status: String,
    history: Vec<String>,
}

#[derive(Debug, Clone)]
enum Message {
    Tick,
    PayloadFetched(Result<VisualizationPayload, String>),
    ConfigFieldChanged(ConfigField, String),
    SubmitConfig,
    ConfigSubmitted(Result<String, String>),
}

#[derive(Debug, Clone, Copy)]
enum ConfigField {
    Width,
    Height,
    Spacing,
    AccessPoints,
    Probes,
    Noise,
    Seed,
    Description,
}

impl Visualizer {
    fn boot() -> (Self, Task<Message>) {
        (
            Visualizer {
                config: ConfigForm::default(),
                payload: None,
                errors: Vec::new(),
                status: "Waiting for survey results...".into(),
                history: Vec::new(),
            },
            Task::perform(fetch_payload(), Message::PayloadFetched),
        )
    }

    fn update(state: &mut Self, message: Message) -> Task<Message> {
        match message {
            Message::Tick => Task::perform(fetch_payload(), Message::PayloadFetched),
            Message::PayloadFetched(Ok(payload)) => {
                let changed = state
                    .payload
                    .as_ref()
                    .map_or(true, |previous| previous.epoch != payload.epoch);
                state.errors = payload
                    .estimates
                    .iter()
                    .filter_map(|entry| entry.error)
                    .map(|error| error as f32)
                    .collect();
                state.status = format!(
                    "Generation {}: {} fingerprints / {} keys",
                    payload.epoch, payload.fingerprint_count, payload.key_count
                );
                if changed {
                    state.push_history(format!(
                        "Generation {}: {} probes, mean error {}",
                        payload.epoch,
                        payload.estimates.len(),
                        format_error(payload.mean_error)
                    ));
                }
                state.payload = Some(payload);
                Task::none()
            }
            Message::PayloadFetched(Err(err)) => {
                state.status = format!("Bridge error: {err}");
                Task::none()
            }
            Message::ConfigFieldChanged(field, value) => {
                state.config.update_field(field, value);
                Task::none()
            }
            Message::SubmitConfig => {
                let payload = state.config.to_payload();
                Task::perform(post_config(payload), Message::ConfigSubmitted)
            }
            Message::ConfigSubmitted(Ok(message)) => {
                state.status = message;
                state.push_history("Scenario submitted".into());
                Task::none()
            }
            Message::ConfigSubmitted(Err(err)) => {
                state.status = format!("Config error: {err}");
                Task::none()
            }
        }
    }

    fn view(state: &Self) -> Element<'_, Message> {
        let estimates = state
            .payload
            .as_ref()
            .map(|payload| payload.estimates.clone())
            .unwrap_or_default();
        let calibration_points = state
            .payload
            .as_ref()
            .map(|payload| payload.calibration_points.clone())
            .unwrap_or_default();
        let notes = state
            .payload
            .as_ref()
            .map(|payload| payload.notes.clone())
            .unwrap_or_default();

        let config_column = column![
            text("Survey Config").size(26),
            text_input("Width (m)", &state.config.width)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::Width, value))
                .padding(6),
            text_input("Height (m)", &state.config.height)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::Height, value))
                .padding(6),
            text_input("Grid spacing (m)", &state.config.spacing)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::Spacing, value))
                .padding(6),
            text_input("Access points", &state.config.access_points)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::AccessPoints, value))
                .padding(6),
            text_input("Probes", &state.config.probes)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::Probes, value))
                .padding(6),
            text_input("RSSI noise (dB)", &state.config.noise)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::Noise, value))
                .padding(6),
            text_input("Seed", &state.config.seed)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::Seed, value))
                .padding(6),
            text_input("Description", &state.config.description)
                .on_input(|value| Message::ConfigFieldChanged(ConfigField::Description, value))
                .padding(6),
            button("POST scenario")
                .on_press(Message::SubmitConfig)
                .padding(10),
            text(&state.status).size(14),
            column![
                text("Parameter definitions").size(16),
                text("Width / height: extent of the surveyed floor area.").size(12),
                text("Grid spacing: distance between calibration capture points.").size(12),
                text("Access points: transmitters placed at random in the area.").size(12),
                text("Probes: held-out positions estimated against the cache.").size(12),
                text("RSSI noise: uniform jitter added to every simulated reading.").size(12),
                text("Seed: deterministic PRNG seeding so scenarios replay consistently.")
                    .size(12),
                text("Description: free-text note echoed by the bridge.").size(12),
            ]
            .spacing(4)
            .padding(6),
        ]
        .spacing(10)
        .padding(16)
        .width(Length::Fixed(360.0));

        let accuracy_info = if let Some(payload) = &state.payload {
            text(format!(
                "Mean error {} / max {} over {} probes",
                format_error(payload.mean_error),
                format_error(payload.max_error),
                payload.estimates.len()
            ))
            .size(18)
        } else {
            text("Accuracy: n/a").size(18)
        };

        let floor_map = Canvas::new(FloorMap::new(&calibration_points, &estimates))
            .width(Length::Fill)
            .height(Length::Fixed(320.0));

        let error_profile = Canvas::new(ErrorProfile {
            data: state.errors.clone(),
        })
        .width(Length::Fill)
        .height(Length::Fixed(160.0));

        let estimate_entries = if estimates.is_empty() {
            Column::new().push(text("No estimates to render").size(12))
        } else {
            estimates.iter().take(6).fold(Column::new().spacing(4), |col, entry| {
                let line = match &entry.estimate {
                    Some(estimate) => format!(
                        "{}: truth ({:.1}, {:.1}) -> ({:.1}, {:.1}) | error {}",
                        entry.probe,
                        entry.truth.x,
                        entry.truth.y,
                        estimate.x,
                        estimate.y,
                        format_error(entry.error)
                    ),
                    None => format!("{}: unresolved", entry.probe),
                };
                col.push(text(line).size(12))
            })
        };

        let notes_list = if notes.is_empty() {
            Column::new().push(text("No notes yet").size(14))
        } else {
            notes
                .iter()
                .rev()
                .fold(Column::new().spacing(4), |col, note| {
                    col.push(text(note.clone()).size(14))
                })
        };

        let history_list = if state.history.is_empty() {
            Column::new().push(text("No activity yet").size(12))
        } else {
            state
                .history
                .iter()
                .rev()
                .fold(Column::new().spacing(4), |col, entry| {
                    col.push(text(entry.clone()).size(12))
                })
        };

        let results_column = column![
            text("Positioning").size(26),
            accuracy_info,
            text("Floor map (grey = calibration, green = truth, orange = estimate)").size(16),
            floor_map,
            text("Error per probe (m)").size(16),
            error_profile,
            text("Recent estimates").size(16),
            Container::new(estimate_entries).padding(6),
            text("Bridge notes").size(16),
            Container::new(scrollable(notes_list).height(Length::Fixed(120.0))).padding(6),
            text("Activity log").size(16),
            Container::new(scrollable(history_list).height(Length::Fixed(90.0))).padding(6),
        ]
        .spacing(10)
        .padding(16)
        .width(Length::Fill);

        let layout = row![config_column, results_column]
            .spacing(20)
            .align_y(Alignment::Start)
            .padding(20);

        Container::new(layout)
            .width(Length::Fill)
            .height(Length::Fill)
            .center_y(Length::Fill)
            .into()
    }

    fn push_history(&mut self, entry: String) {
        self.history.push(entry);
        if self.history.len() > 20 {
            self.history.remove(0);
        }
    }
}

fn format_error(error: Option<f64>) -> String {
    error.map_or_else(|| "n/a".into(), |value| format!("{:.2} m", value))
}

async fn fetch_payload() -> Result<VisualizationPayload, String> {
    let response = reqwest::get("http://127.0.0.1:9000/payload")
        .await
        .map_err(|e| e.to_string())?;
    response
        .json::<VisualizationPayload>()
        .await
        .map_err(|e| e.to_string())
}

async fn post_config(config: ScenarioConfig) -> Result<String, String> {
    let client = reqwest::Client::new();
    let response = client
        .post("http://127.0.0.1:9000/ingest-config")
        .json(&config)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok("Scenario submitted".into())
    } else {
        let status = response.status();
        let text = response.text().await.unwrap_or_else(|_| "".into());
        Err(format!("{}: {}", status, text))
    }
}

#[derive(Debug, Clone)]
struct ConfigForm {
    width: String,
    height: String,
    spacing: String,
    access_points: String,
    probes: String,
    noise: String,
    seed: String,
    description: String,
}

impl ConfigForm {
    fn default() -> Self {
        Self {
            width: "40".into(),
            height: "20".into(),
            spacing: "2".into(),
            access_points: "6".into(),
            probes: "25".into(),
            noise: "2.0".into(),
            seed: "312".into(),
            description: "Rust visualizer scenario".into(),
        }
    }

    fn update_field(&mut self, field: ConfigField, value: String) {
        match field {
            ConfigField::Width => self.width = value,
            ConfigField::Height => self.height = value,
            ConfigField::Spacing => self.spacing = value,
            ConfigField::AccessPoints => self.access_points = value,
            ConfigField::Probes => self.probes = value,
            ConfigField::Noise => self.noise = value,
            ConfigField::Seed => self.seed = value,
            ConfigField::Description => self.description = value,
        }
    }

    fn to_payload(&self) -> ScenarioConfig {
        ScenarioConfig {
            width: self.width.parse().ok(),
            height: self.height.parse().ok(),
            spacing: self.spacing.parse().ok(),
            access_points: self.access_points.parse().ok(),
            probes: self.probes.parse().ok(),
            noise: self.noise.parse().ok(),
            seed: self.seed.parse().ok(),
            description: if self.description.trim().is_empty() {
                None
            } else {
                Some(self.description.clone())
            },
        }
    }
}

/// Unparsable fields are omitted so the bridge falls back to its defaults.
#[derive(Debug, Serialize)]
struct ScenarioConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    spacing: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_points: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    probes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    noise: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EstimateEntry {
    probe: String,
    truth: Position,
    #[serde(default)]
    estimate: Option<Position>,
    #[serde(default)]
    error: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct VisualizationPayload {
    #[serde(default)]
    epoch: u64,
    #[serde(default)]
    calibration_points: Vec<Position>,
    #[serde(default)]
    estimates: Vec<EstimateEntry>,
    #[serde(default)]
    fingerprint_count: usize,
    #[serde(default)]
    key_count: usize,
    #[serde(default)]
    mean_error: Option<f64>,
    #[serde(default)]
    max_error: Option<f64>,
    #[serde(default)]
    notes: Vec<String>,
}

#[derive(Clone)]
struct ErrorProfile {
    data: Vec<f32>,
}

impl canvas::Program<Message> for ErrorProfile {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        frame.fill_rectangle(
            Point::ORIGIN,
            bounds.size(),
            Color::from_rgb(0.05, 0.05, 0.05),
        );

        if !self.data.is_empty() {
            let max = self.data.iter().cloned().fold(0.0, f32::max).max(1.0);
            let slot = bounds.width / self.data.len() as f32;
            for (i, value) in self.data.iter().enumerate() {
                let bar_height = (value / max).clamp(0.0, 1.0) * (bounds.height - 4.0);
                frame.fill_rectangle(
                    Point::new(i as f32 * slot + 1.0, bounds.height - bar_height),
                    iced::Size::new((slot - 2.0).max(1.0), bar_height),
                    Color::from_rgb(0.18, 0.72, 0.89),
                );
            }
        }

        vec![frame.into_geometry()]
    }
}

/// Plan view of the surveyed area, scaled to fit the canvas.
#[derive(Clone)]
struct FloorMap {
    calibration: Vec<Position>,
    estimates: Vec<EstimateEntry>,
}

impl FloorMap {
    fn new(calibration: &[Position], estimates: &[EstimateEntry]) -> Self {
        Self {
            calibration: calibration.to_vec(),
            estimates: estimates.to_vec(),
        }
    }

    fn extent(&self) -> (f32, f32, f32, f32) {
        let points = self
            .calibration
            .iter()
            .chain(self.estimates.iter().map(|entry| &entry.truth))
            .chain(self.estimates.iter().filter_map(|entry| entry.estimate.as_ref()));
        let mut extent = (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
        for position in points {
            let (x, y) = (position.x as f32, position.y as f32);
            extent = (extent.0.min(x), extent.1.min(y), extent.2.max(x), extent.3.max(y));
        }
        if extent.0 > extent.2 {
            (0.0, 0.0, 1.0, 1.0)
        } else {
            extent
        }
    }
}

impl canvas::Program<Message> for FloorMap {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        frame.fill_rectangle(
            Point::ORIGIN,
            bounds.size(),
            Color::from_rgb(0.02, 0.02, 0.04),
        );

        let margin = 14.0;
        let (min_x, min_y, max_x, max_y) = self.extent();
        let scale = ((bounds.width - 2.0 * margin) / (max_x - min_x).max(1.0))
            .min((bounds.height - 2.0 * margin) / (max_y - min_y).max(1.0));
        let project = |position: &Position| {
            Point::new(
                margin + (position.x as f32 - min_x) * scale,
                bounds.height - margin - (position.y as f32 - min_y) * scale,
            )
        };

        for position in &self.calibration {
            let marker = Path::new(|builder| builder.circle(project(position), 2.0));
            frame.fill(&marker, Color::from_rgb(0.4, 0.4, 0.45));
        }

        for entry in &self.estimates {
            let truth = project(&entry.truth);
            if let Some(estimate) = &entry.estimate {
                let estimate = project(estimate);
                let offset = Path::line(truth, estimate);
                frame.stroke(
                    &offset,
                    Stroke::default()
                        .with_color(Color::from_rgb(0.6, 0.6, 0.3))
                        .with_width(1.0),
                );
                let marker = Path::new(|builder| builder.circle(estimate, 4.0));
                frame.fill(&marker, Color::from_rgb(0.95, 0.55, 0.2));
            }
            let marker = Path::new(|builder| builder.circle(truth, 4.0));
            frame.fill(&marker, Color::from_rgb(0.3, 0.85, 0.4));
        }

        vec![frame.into_geometry()]
    }
}
