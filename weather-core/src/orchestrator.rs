//! Fetch cycle: location → place name → current weather + forecast.

use parking_lot::Mutex;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::{CycleError, FetchError},
    geocode::Geocoder,
    input,
    location::{LocationProvider, UnavailableLocation, location_from_config},
    model::{
        Coordinates, CurrentWeather, CycleReport, FetchRequest, ForecastList, PlaceName, Units,
        WeatherTarget,
    },
    provider::{WeatherClient, client_from_config},
};

const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Progress of the most recent fetch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Locating,
    Resolving,
    Fetching,
    Done,
}

#[derive(Debug)]
pub struct FetchOrchestrator {
    location: Box<dyn LocationProvider>,
    geocoder: Box<dyn Geocoder>,
    client: Box<dyn WeatherClient>,
    units: Units,
    location_timeout: Duration,
    state: watch::Sender<FetchState>,
    next_cycle: AtomicU64,
    /// Current cycle. `state` is only published while this is held.
    in_flight: Mutex<Option<(u64, CancellationToken)>>,
}

impl FetchOrchestrator {
    pub fn new(
        location: Box<dyn LocationProvider>,
        geocoder: Box<dyn Geocoder>,
        client: Box<dyn WeatherClient>,
    ) -> Self {
        let (state, _) = watch::channel(FetchState::Idle);

        Self {
            location,
            geocoder,
            client,
            units: Units::default(),
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
            state,
            next_cycle: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    /// Wire the OpenWeather client (which also geocodes) and the configured
    /// location provider.
    ///
    /// A location setting that cannot be built only fails cycles that need a
    /// location; manual lookups still work.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = client_from_config(config)?;
        let location = location_from_config(config).unwrap_or_else(|err| {
            tracing::warn!(%err, "Location provider unavailable");
            let reason = err.to_string().replace('\n', " ");
            Box::new(UnavailableLocation::new(reason)) as Box<dyn LocationProvider>
        });

        Ok(Self::new(location, Box::new(client.clone()), Box::new(client))
            .with_units(config.units)
            .with_location_timeout(config.location_timeout()))
    }

    pub fn with_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    pub fn with_location_timeout(mut self, timeout: Duration) -> Self {
        self.location_timeout = timeout;
        self
    }

    pub fn state(&self) -> FetchState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<FetchState> {
        self.state.subscribe()
    }

    /// Run one fetch cycle. A cycle already in flight is cancelled and
    /// resolves to [`CycleError::Cancelled`].
    ///
    /// Weather and forecast failures do not fail the cycle; they are carried
    /// in the report next to whatever half succeeded.
    pub async fn run(&self, request: FetchRequest) -> Result<CycleReport, CycleError> {
        let (id, token) = self.begin_cycle();
        tracing::info!(cycle = id, ?request, "Starting fetch cycle");

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(CycleError::Cancelled),
            outcome = self.cycle(id, request) => outcome,
        };

        self.finish_cycle(id);

        match &outcome {
            Ok(report) => tracing::info!(
                cycle = id,
                place = %report.target,
                current = report.current.is_ok(),
                forecast = report.forecast.is_ok(),
                "Fetch cycle done"
            ),
            Err(err) => tracing::warn!(cycle = id, %err, "Fetch cycle failed"),
        }

        outcome
    }

    /// Cancel the cycle in flight, if any.
    pub fn cancel(&self) {
        let mut in_flight = self.in_flight.lock();
        if let Some((id, token)) = in_flight.take() {
            tracing::debug!(cycle = id, "Cancelling fetch cycle");
            token.cancel();
            self.state.send_replace(FetchState::Done);
        }
    }

    fn begin_cycle(&self) -> (u64, CancellationToken) {
        let id = self.next_cycle.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let mut in_flight = self.in_flight.lock();
        if let Some((prev, prev_token)) = in_flight.replace((id, token.clone())) {
            tracing::debug!(cycle = prev, "Superseded by cycle {id}");
            prev_token.cancel();
        }
        self.state.send_replace(FetchState::Idle);

        (id, token)
    }

    /// Publishes `Done` if `id` is still the current cycle.
    fn finish_cycle(&self, id: u64) -> bool {
        let mut in_flight = self.in_flight.lock();
        match in_flight.as_ref() {
            Some((current, _)) if *current == id => {
                *in_flight = None;
                self.state.send_replace(FetchState::Done);
                true
            }
            _ => false,
        }
    }

    fn transition(&self, id: u64, next: FetchState) -> bool {
        let in_flight = self.in_flight.lock();
        match in_flight.as_ref() {
            Some((current, _)) if *current == id => {
                tracing::debug!(cycle = id, state = ?next, "Fetch state");
                self.state.send_replace(next);
                true
            }
            _ => false,
        }
    }

    async fn cycle(&self, id: u64, request: FetchRequest) -> Result<CycleReport, CycleError> {
        let target = match request {
            FetchRequest::Manual(text) => input::classify(&text)?,
            FetchRequest::CurrentLocation => {
                self.transition(id, FetchState::Locating);
                let coordinates = self.locate().await?;

                self.transition(id, FetchState::Resolving);
                let name = self.resolve(coordinates).await?;

                WeatherTarget::Place { name }
            }
        };

        self.transition(id, FetchState::Fetching);
        let (current, forecast) = self.fetch(&target).await;

        if let Err(err) = &current {
            tracing::warn!(place = %target, %err, "Error fetching weather");
        }
        if let Err(err) = &forecast {
            tracing::warn!(place = %target, %err, "Error fetching forecast");
        }

        Ok(CycleReport {
            target,
            units: self.units,
            current,
            forecast,
        })
    }

    async fn locate(&self) -> Result<Coordinates, CycleError> {
        let coordinates = tokio::time::timeout(self.location_timeout, self.location.locate())
            .await
            .map_err(|_| {
                CycleError::LocationUnavailable(format!(
                    "no fix within {}s",
                    self.location_timeout.as_secs_f32()
                ))
            })??;

        tracing::debug!(%coordinates, "Located");
        Ok(coordinates)
    }

    async fn resolve(&self, coordinates: Coordinates) -> Result<PlaceName, CycleError> {
        match self.geocoder.reverse_geocode(coordinates).await {
            Ok(Some(name)) => {
                tracing::debug!(%coordinates, %name, "Reverse geocoded");
                Ok(name)
            }
            Ok(None) => Err(CycleError::GeocodeUnresolved),
            Err(err) => {
                tracing::warn!(%coordinates, %err, "Reverse geocoding failed");
                Err(CycleError::GeocodeUnresolved)
            }
        }
    }

    /// Both calls run concurrently; neither result depends on the other.
    async fn fetch(
        &self,
        target: &WeatherTarget,
    ) -> (
        Result<CurrentWeather, FetchError>,
        Result<ForecastList, FetchError>,
    ) {
        let units = self.units;
        match target {
            WeatherTarget::Place { name } => tokio::join!(
                self.client.fetch_by_name(name, units),
                self.client.fetch_forecast_by_name(name, units),
            ),
            WeatherTarget::Coordinates(coordinates) => tokio::join!(
                self.client.fetch_by_coordinates(*coordinates, units),
                self.client.fetch_forecast_by_coordinates(*coordinates, units),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LocationError;
    use crate::model::ForecastEntry;
    use async_trait::async_trait;
    use std::sync::Arc;

    type Calls = Arc<Mutex<Vec<String>>>;

    #[derive(Debug)]
    struct FakeLocation {
        result: Result<Coordinates, LocationError>,
        delay: Duration,
        calls: Calls,
    }

    #[async_trait]
    impl LocationProvider for FakeLocation {
        async fn locate(&self) -> Result<Coordinates, LocationError> {
            self.calls.lock().push("locate".into());
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    #[derive(Debug)]
    struct FakeGeocoder {
        result: Result<Option<PlaceName>, FetchError>,
        calls: Calls,
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn reverse_geocode(
            &self,
            coordinates: Coordinates,
        ) -> Result<Option<PlaceName>, FetchError> {
            self.calls.lock().push(format!("geocode:{coordinates}"));
            self.result.clone()
        }
    }

    #[derive(Debug)]
    struct FakeClient {
        current: Result<CurrentWeather, FetchError>,
        forecast: Result<ForecastList, FetchError>,
        calls: Calls,
    }

    #[async_trait]
    impl WeatherClient for FakeClient {
        async fn fetch_by_name(
            &self,
            place: &str,
            units: Units,
        ) -> Result<CurrentWeather, FetchError> {
            self.calls.lock().push(format!("weather:name:{place}:{units}"));
            self.current.clone()
        }

        async fn fetch_by_coordinates(
            &self,
            c: Coordinates,
            units: Units,
        ) -> Result<CurrentWeather, FetchError> {
            self.calls
                .lock()
                .push(format!("weather:coords:{},{}:{units}", c.latitude, c.longitude));
            self.current.clone()
        }

        async fn fetch_forecast_by_name(
            &self,
            place: &str,
            units: Units,
        ) -> Result<ForecastList, FetchError> {
            self.calls.lock().push(format!("forecast:name:{place}:{units}"));
            self.forecast.clone()
        }

        async fn fetch_forecast_by_coordinates(
            &self,
            c: Coordinates,
            units: Units,
        ) -> Result<ForecastList, FetchError> {
            self.calls
                .lock()
                .push(format!("forecast:coords:{},{}:{units}", c.latitude, c.longitude));
            self.forecast.clone()
        }
    }

    fn weather() -> CurrentWeather {
        CurrentWeather {
            place_name: "London".into(),
            temperature: 12.3,
            humidity: 81,
            description: "light rain".into(),
        }
    }

    fn forecast() -> ForecastList {
        ForecastList::new(vec![
            ForecastEntry {
                timestamp: 1_700_000_000,
                temperature: 12.0,
                description: "clouds".into(),
            },
            ForecastEntry {
                timestamp: 1_700_003_600,
                temperature: 11.0,
                description: "rain".into(),
            },
        ])
    }

    struct Harness {
        orchestrator: FetchOrchestrator,
        calls: Calls,
    }

    impl Harness {
        fn recorded(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn network_calls(&self) -> usize {
            self.recorded()
                .iter()
                .filter(|c| c.starts_with("weather:") || c.starts_with("forecast:"))
                .count()
        }
    }

    struct Setup {
        location: Result<Coordinates, LocationError>,
        location_delay: Duration,
        geocode: Result<Option<PlaceName>, FetchError>,
        current: Result<CurrentWeather, FetchError>,
        forecast: Result<ForecastList, FetchError>,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                location: Ok(Coordinates::new(40.6782, -73.9442)),
                location_delay: Duration::ZERO,
                geocode: Ok(Some("Brooklyn".into())),
                current: Ok(weather()),
                forecast: Ok(forecast()),
            }
        }
    }

    impl Setup {
        fn build(self) -> Harness {
            let calls = Calls::default();
            let orchestrator = FetchOrchestrator::new(
                Box::new(FakeLocation {
                    result: self.location,
                    delay: self.location_delay,
                    calls: calls.clone(),
                }),
                Box::new(FakeGeocoder {
                    result: self.geocode,
                    calls: calls.clone(),
                }),
                Box::new(FakeClient {
                    current: self.current,
                    forecast: self.forecast,
                    calls: calls.clone(),
                }),
            );
            Harness { orchestrator, calls }
        }
    }

    fn sorted(mut calls: Vec<String>) -> Vec<String> {
        calls.sort();
        calls
    }

    #[tokio::test]
    async fn manual_coordinates_fetch_by_coordinates() {
        let h = Setup::default().build();

        let report = h
            .orchestrator
            .run(FetchRequest::Manual("40.71, -74.00".into()))
            .await
            .unwrap();

        assert_eq!(
            report.target,
            WeatherTarget::Coordinates(Coordinates::new(40.71, -74.0))
        );
        assert_eq!(
            sorted(h.recorded()),
            vec![
                "forecast:coords:40.71,-74:metric".to_string(),
                "weather:coords:40.71,-74:metric".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn manual_place_fetches_by_name() {
        let Harness { orchestrator, calls } = Setup::default().build();
        let orchestrator = orchestrator.with_units(Units::Imperial);

        let report = orchestrator
            .run(FetchRequest::Manual("London".into()))
            .await
            .unwrap();

        assert_eq!(report.units, Units::Imperial);
        assert_eq!(
            sorted(calls.lock().clone()),
            vec![
                "forecast:name:London:imperial".to_string(),
                "weather:name:London:imperial".to_string(),
            ]
        );
        assert_eq!(orchestrator.state(), FetchState::Done);
    }

    #[tokio::test]
    async fn malformed_manual_input_issues_no_calls() {
        let h = Setup::default().build();

        let err = h
            .orchestrator
            .run(FetchRequest::Manual("40.71,".into()))
            .await
            .unwrap_err();

        assert!(matches!(err, CycleError::InvalidManualInput(_)));
        assert!(h.recorded().is_empty());
        assert_eq!(h.orchestrator.state(), FetchState::Done);
    }

    #[tokio::test]
    async fn forecast_failure_keeps_current_weather() {
        let h = Setup {
            forecast: Err(FetchError::Status {
                status: 500,
                message: "boom".into(),
            }),
            ..Setup::default()
        }
        .build();

        let report = h
            .orchestrator
            .run(FetchRequest::Manual("London".into()))
            .await
            .unwrap();

        assert_eq!(report.current(), Some(&weather()));
        assert!(report.forecast().is_none());
        assert_eq!(report.forecast.unwrap_err().status(), Some(500));
    }

    #[tokio::test]
    async fn weather_failure_keeps_forecast() {
        let h = Setup {
            current: Err(FetchError::Transport("timed out".into())),
            ..Setup::default()
        }
        .build();

        let report = h
            .orchestrator
            .run(FetchRequest::Manual("London".into()))
            .await
            .unwrap();

        assert!(report.current().is_none());
        let stamps: Vec<i64> = report.forecast().unwrap().iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![1_700_000_000, 1_700_003_600]);
    }

    #[tokio::test]
    async fn location_flow_geocodes_then_fetches_by_name() {
        let h = Setup::default().build();

        let report = h.orchestrator.run(FetchRequest::CurrentLocation).await.unwrap();

        assert_eq!(
            report.target,
            WeatherTarget::Place {
                name: "Brooklyn".into()
            }
        );
        let calls = h.recorded();
        assert_eq!(calls[0], "locate");
        assert_eq!(calls[1], "geocode:40.6782, -73.9442");
        assert_eq!(
            sorted(calls[2..].to_vec()),
            vec![
                "forecast:name:Brooklyn:metric".to_string(),
                "weather:name:Brooklyn:metric".to_string(),
            ]
        );
        assert_eq!(h.orchestrator.state(), FetchState::Done);
    }

    #[tokio::test]
    async fn permission_denied_stops_before_geocoding() {
        let h = Setup {
            location: Err(LocationError::PermissionDenied),
            ..Setup::default()
        }
        .build();

        let err = h.orchestrator.run(FetchRequest::CurrentLocation).await.unwrap_err();

        assert_eq!(err, CycleError::PermissionDenied);
        assert_eq!(h.recorded(), vec!["locate".to_string()]);
    }

    #[tokio::test]
    async fn unresolved_place_stops_before_fetching() {
        let h = Setup {
            geocode: Ok(None),
            ..Setup::default()
        }
        .build();

        let err = h.orchestrator.run(FetchRequest::CurrentLocation).await.unwrap_err();

        assert_eq!(err, CycleError::GeocodeUnresolved);
        assert_eq!(h.network_calls(), 0);
    }

    #[tokio::test]
    async fn geocoder_error_counts_as_unresolved() {
        let h = Setup {
            geocode: Err(FetchError::Status {
                status: 401,
                message: "Invalid API key".into(),
            }),
            ..Setup::default()
        }
        .build();

        let err = h.orchestrator.run(FetchRequest::CurrentLocation).await.unwrap_err();

        assert_eq!(err, CycleError::GeocodeUnresolved);
        assert_eq!(h.network_calls(), 0);
    }

    #[tokio::test]
    async fn slow_location_times_out() {
        let h = Setup {
            location_delay: Duration::from_secs(30),
            ..Setup::default()
        }
        .build();
        let orchestrator = h
            .orchestrator
            .with_location_timeout(Duration::from_millis(20));

        let err = orchestrator.run(FetchRequest::CurrentLocation).await.unwrap_err();

        assert!(matches!(err, CycleError::LocationUnavailable(msg) if msg.contains("no fix")));
    }

    #[tokio::test]
    async fn new_cycle_cancels_the_one_in_flight() {
        let h = Setup {
            location_delay: Duration::from_secs(30),
            ..Setup::default()
        }
        .build();
        let orchestrator = Arc::new(h.orchestrator.with_location_timeout(Duration::from_secs(60)));
        let mut states = orchestrator.subscribe();

        let first = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.run(FetchRequest::CurrentLocation).await }
        });
        states
            .wait_for(|s| *s == FetchState::Locating)
            .await
            .unwrap();

        let second = orchestrator
            .run(FetchRequest::Manual("London".into()))
            .await
            .unwrap();

        assert_eq!(first.await.unwrap().unwrap_err(), CycleError::Cancelled);
        assert!(second.current().is_some());
        assert_eq!(orchestrator.state(), FetchState::Done);
    }

    #[tokio::test]
    async fn explicit_cancel_ends_the_cycle() {
        let h = Setup {
            location_delay: Duration::from_secs(30),
            ..Setup::default()
        }
        .build();
        let orchestrator = Arc::new(h.orchestrator);
        let mut states = orchestrator.subscribe();

        let cycle = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.run(FetchRequest::CurrentLocation).await }
        });
        states
            .wait_for(|s| *s == FetchState::Locating)
            .await
            .unwrap();

        orchestrator.cancel();

        assert_eq!(cycle.await.unwrap().unwrap_err(), CycleError::Cancelled);
        assert_eq!(orchestrator.state(), FetchState::Done);
    }

    #[test]
    fn superseded_cycle_cannot_publish_state() {
        let h = Setup::default().build();
        let orchestrator = h.orchestrator;

        let (old, old_token) = orchestrator.begin_cycle();
        let (new, _) = orchestrator.begin_cycle();
        assert!(old_token.is_cancelled());

        assert!(orchestrator.transition(new, FetchState::Locating));
        assert!(!orchestrator.transition(old, FetchState::Fetching));
        assert!(!orchestrator.finish_cycle(old));
        assert_eq!(orchestrator.state(), FetchState::Locating);

        assert!(orchestrator.finish_cycle(new));
        assert_eq!(orchestrator.state(), FetchState::Done);
    }

    mod wiring {
        use super::*;
        use crate::config::LocationSource;
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        /// Location turned on with the fixed source but no coordinates stored.
        fn half_configured(server: &MockServer) -> Config {
            let mut cfg = Config::default();
            cfg.set_api_key("KEY".into());
            cfg.base_url = server.uri();
            cfg.location.enabled = true;
            cfg.location.provider = LocationSource::Fixed;
            cfg
        }

        async fn mount_london(server: &MockServer) {
            Mock::given(method("GET"))
                .and(path("/data/2.5/weather"))
                .and(query_param("q", "London"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "name": "London",
                    "main": { "temp": 12.3, "humidity": 81 },
                    "weather": [{ "description": "light rain" }]
                })))
                .mount(server)
                .await;
            Mock::given(method("GET"))
                .and(path("/data/2.5/forecast"))
                .and(query_param("q", "London"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "list": [
                        { "dt": 1700000000, "main": { "temp": 12.0, "humidity": 80 },
                          "weather": [{ "description": "clouds" }] }
                    ]
                })))
                .mount(server)
                .await;
        }

        #[tokio::test]
        async fn manual_lookup_ignores_broken_location_setting() {
            let server = MockServer::start().await;
            mount_london(&server).await;

            let orchestrator = FetchOrchestrator::from_config(&half_configured(&server)).unwrap();
            let report = orchestrator
                .run(FetchRequest::Manual("London".into()))
                .await
                .unwrap();

            assert_eq!(report.current().unwrap().description, "light rain");
            assert_eq!(report.forecast().unwrap().entries()[0].timestamp, 1_700_000_000);
        }

        #[tokio::test]
        async fn broken_location_setting_fails_only_the_location_flow() {
            let server = MockServer::start().await;

            let orchestrator = FetchOrchestrator::from_config(&half_configured(&server)).unwrap();
            let err = orchestrator.run(FetchRequest::CurrentLocation).await.unwrap_err();

            assert!(matches!(
                err,
                CycleError::LocationUnavailable(msg)
                    if msg.contains("needs latitude and longitude") && !msg.contains('\n')
            ));
        }
    }
}
