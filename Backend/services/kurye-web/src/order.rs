//! Order-intent wizard. An order is never stored: the last step turns the
//! collected answers into a WhatsApp deep link and that is the whole hand-off.

use chrono::NaiveDateTime;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const WHATSAPP_BASE: &str = "https://wa.me/";

/// Component encoding: spaces become `%20`, never `+`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("whatsapp phone number is not configured")]
    NoPhone,
    #[error("order can only be sent from the confirm step")]
    NotConfirmed,
    #[error("invalid deep link: {0}")]
    Link(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Location = 1,
    CargoDetails = 2,
    Timing = 3,
    Confirm = 4,
}

impl Step {
    pub const FIRST: Step = Step::Location;
    pub const LAST: Step = Step::Confirm;

    pub fn number(self) -> u8 {
        self as u8
    }

    /// Clamps out-of-range numbers onto the first or last step.
    pub fn from_number(n: i64) -> Step {
        match n {
            i64::MIN..=1 => Step::Location,
            2 => Step::CargoDetails,
            3 => Step::Timing,
            _ => Step::Confirm,
        }
    }

    pub fn next(self) -> Step {
        Step::from_number(self.number() as i64 + 1)
    }

    pub fn prev(self) -> Step {
        Step::from_number(self.number() as i64 - 1)
    }
}

/// Pickup or drop-off point chosen from the neighborhood combobox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub district: String,
    pub neighborhood: String,
    pub lat: f64,
    pub lng: f64,
}

impl Stop {
    pub fn label(&self) -> String {
        format!("{}, {}", self.neighborhood, self.district)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CargoType {
    Document,
    Package,
    Food,
    Flower,
    Medicine,
    Other,
}

impl CargoType {
    pub fn label(self) -> &'static str {
        match self {
            CargoType::Document => "Evrak / Dosya",
            CargoType::Package => "Paket / Koli",
            CargoType::Food => "Yemek",
            CargoType::Flower => "Çiçek",
            CargoType::Medicine => "İlaç",
            CargoType::Other => "Diğer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    Now,
    Later,
}

/// Answers collected so far; any field may still be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub origin: Option<Stop>,
    pub destination: Option<Stop>,
    pub cargo_type: Option<CargoType>,
    pub weight: Option<String>,
    pub detail: Option<String>,
    pub timing: Option<Timing>,
    pub scheduled_at: Option<NaiveDateTime>,
}

impl OrderDraft {
    pub fn step_valid(&self, step: Step) -> bool {
        match step {
            Step::Location => self.origin.is_some() && self.destination.is_some(),
            Step::CargoDetails => self.cargo_type.is_some(),
            // "later" may proceed without a date
            Step::Timing => self.timing.is_some(),
            Step::Confirm => true,
        }
    }

    pub fn into_intent(self) -> Result<OrderIntent, OrderError> {
        Ok(OrderIntent {
            origin: self.origin.ok_or(OrderError::Missing("origin"))?,
            destination: self.destination.ok_or(OrderError::Missing("destination"))?,
            cargo_type: self.cargo_type.ok_or(OrderError::Missing("cargo_type"))?,
            weight: non_blank(self.weight),
            detail: non_blank(self.detail),
            timing: self.timing.ok_or(OrderError::Missing("timing"))?,
            scheduled_at: self.scheduled_at,
        })
    }
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// A complete order, ready to be formatted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub origin: Stop,
    pub destination: Stop,
    pub cargo_type: CargoType,
    pub weight: Option<String>,
    pub detail: Option<String>,
    pub timing: Timing,
    pub scheduled_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderLink {
    pub message: String,
    pub url: String,
}

pub fn format_message(o: &OrderIntent) -> String {
    let mut lines = vec![
        "Merhaba, moto kurye talebim var.".to_string(),
        String::new(),
        format!("📍 Alış: {}", o.origin.label()),
        format!("🏁 Teslimat: {}", o.destination.label()),
        format!("📦 Gönderi: {}", o.cargo_type.label()),
    ];
    if let Some(w) = &o.weight {
        lines.push(format!("⚖️ Ağırlık: {w}"));
    }
    if let Some(d) = &o.detail {
        lines.push(format!("📝 Detay: {d}"));
    }
    let timing = match (o.timing, o.scheduled_at) {
        (Timing::Now, _) => "Hemen".to_string(),
        (Timing::Later, Some(at)) => format!("İleri tarih: {}", at.format("%d.%m.%Y %H:%M")),
        (Timing::Later, None) => "İleri tarih (belirtilmedi)".to_string(),
    };
    lines.push(format!("⏰ Zaman: {timing}"));
    lines.join("\n")
}

/// `https://wa.me/<digits>?text=<encoded message>`.
pub fn whatsapp_link(phone: &str, message: &str) -> Result<Url, OrderError> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(OrderError::NoPhone);
    }
    let text = utf8_percent_encode(message, COMPONENT);
    Url::parse(&format!("{WHATSAPP_BASE}{digits}?text={text}"))
        .map_err(|e| OrderError::Link(e.to_string()))
}

pub fn build_link(phone: &str, intent: &OrderIntent) -> Result<OrderLink, OrderError> {
    let message = format_message(intent);
    let url = whatsapp_link(phone, &message)?;
    Ok(OrderLink {
        message,
        url: url.into(),
    })
}

/// Linear four-step form. `next` is a no-op until the current step is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderWizard {
    step: Step,
    pub draft: OrderDraft,
}

impl Default for OrderWizard {
    fn default() -> Self {
        Self {
            step: Step::FIRST,
            draft: OrderDraft::default(),
        }
    }
}

impl OrderWizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn can_advance(&self) -> bool {
        self.step != Step::LAST && self.draft.step_valid(self.step)
    }

    pub fn next(&mut self) -> Step {
        if self.can_advance() {
            self.step = self.step.next();
        }
        self.step
    }

    pub fn prev(&mut self) -> Step {
        self.step = self.step.prev();
        self.step
    }

    pub fn finish(&self, phone: &str) -> Result<OrderLink, OrderError> {
        if self.step != Step::Confirm {
            return Err(OrderError::NotConfirmed);
        }
        build_link(phone, &self.draft.clone().into_intent()?)
    }
}

/// Async data slot behind a dropdown or combobox.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoadState<T> {
    #[default]
    Idle,
    Loading,
    Loaded(T),
    Failed(String),
}

impl<T> LoadState<T> {
    pub fn start(&mut self) {
        *self = LoadState::Loading;
    }

    /// Results arriving while not loading are dropped.
    pub fn finish<E: std::fmt::Display>(&mut self, result: Result<T, E>) {
        if !matches!(self, LoadState::Loading) {
            return;
        }
        *self = match result {
            Ok(v) => LoadState::Loaded(v),
            Err(e) => LoadState::Failed(e.to_string()),
        };
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            LoadState::Loaded(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use percent_encoding::percent_decode_str;

    fn stop(district: &str, neighborhood: &str) -> Stop {
        Stop {
            district: district.into(),
            neighborhood: neighborhood.into(),
            lat: 41.0,
            lng: 29.0,
        }
    }

    fn intent() -> OrderIntent {
        OrderIntent {
            origin: stop("Kadıköy", "Moda"),
            destination: stop("Beşiktaş", "Levent & Etiler"),
            cargo_type: CargoType::Package,
            weight: Some("2 kg".into()),
            detail: Some("Kırılacak eşya, dikkat!".into()),
            timing: Timing::Now,
            scheduled_at: None,
        }
    }

    #[test]
    fn step_counter_stays_in_bounds() {
        let mut w = OrderWizard::new();
        for _ in 0..10 {
            w.prev();
            assert_eq!(w.step(), Step::Location);
        }
        w.draft = OrderDraft {
            origin: Some(stop("Kadıköy", "Moda")),
            destination: Some(stop("Şişli", "Nişantaşı")),
            cargo_type: Some(CargoType::Document),
            timing: Some(Timing::Now),
            ..OrderDraft::default()
        };
        for _ in 0..10 {
            let s = w.next().number();
            assert!((1..=4).contains(&s));
        }
        assert_eq!(w.step(), Step::Confirm);
        for _ in 0..10 {
            let s = w.prev().number();
            assert!((1..=4).contains(&s));
        }
        assert_eq!(w.step(), Step::Location);
    }

    #[test]
    fn step_number_clamps() {
        assert_eq!(Step::from_number(-5), Step::Location);
        assert_eq!(Step::from_number(0), Step::Location);
        assert_eq!(Step::from_number(3), Step::Timing);
        assert_eq!(Step::from_number(99), Step::Confirm);
    }

    #[test]
    fn next_blocked_until_step_valid() {
        let mut w = OrderWizard::new();
        assert_eq!(w.next(), Step::Location);
        w.draft.origin = Some(stop("Kadıköy", "Moda"));
        assert_eq!(w.next(), Step::Location);
        w.draft.destination = Some(stop("Fatih", "Balat"));
        assert_eq!(w.next(), Step::CargoDetails);
        w.draft.detail = Some("only detail".into());
        assert_eq!(w.next(), Step::CargoDetails);
        w.draft.cargo_type = Some(CargoType::Food);
        assert_eq!(w.next(), Step::Timing);
        assert_eq!(w.next(), Step::Timing);
        // later without a date still advances
        w.draft.timing = Some(Timing::Later);
        assert_eq!(w.next(), Step::Confirm);
    }

    #[test]
    fn finish_only_on_confirm() {
        let w = OrderWizard::new();
        assert_eq!(w.finish("905551112233"), Err(OrderError::NotConfirmed));
    }

    #[test]
    fn message_contains_both_locations_verbatim() {
        let msg = format_message(&intent());
        assert!(msg.contains("Moda"));
        assert!(msg.contains("Kadıköy"));
        assert!(msg.contains("Levent & Etiler"));
        assert!(msg.contains("Beşiktaş"));
        assert!(msg.contains("2 kg"));
        assert!(msg.contains("Kırılacak eşya, dikkat!"));
        assert!(msg.contains("Hemen"));
    }

    #[test]
    fn optional_fields_are_omitted() {
        let mut o = intent();
        o.weight = None;
        o.detail = None;
        o.timing = Timing::Later;
        let msg = format_message(&o);
        assert!(!msg.contains("Ağırlık"));
        assert!(!msg.contains("Detay"));
        assert!(msg.contains("belirtilmedi"));

        o.scheduled_at = NaiveDateTime::parse_from_str("2026-10-16 14:30", "%Y-%m-%d %H:%M").ok();
        assert!(format_message(&o).contains("16.10.2026 14:30"));
    }

    #[test]
    fn link_decodes_back_to_message() {
        let link = build_link("+90 (555) 111 22 33", &intent()).unwrap();
        assert!(link.url.starts_with("https://wa.me/905551112233?text="));
        let url = Url::parse(&link.url).unwrap();
        let query = url.query().unwrap();
        let encoded = query.strip_prefix("text=").unwrap();
        let text = percent_decode_str(encoded).decode_utf8().unwrap();
        assert_eq!(text, link.message);
        // & and newlines must not leak unencoded into the query
        assert!(!query.contains('\n'));
        assert_eq!(query.matches('&').count(), 0);
    }

    #[test]
    fn link_encodes_spaces_as_percent_twenty() {
        let url = whatsapp_link("905551112233", "Merhaba moto kurye").unwrap();
        assert_eq!(
            url.as_str(),
            "https://wa.me/905551112233?text=Merhaba%20moto%20kurye"
        );
        let url = whatsapp_link("905551112233", "1+1 & ğüşİ").unwrap();
        let encoded = url.query().unwrap().strip_prefix("text=").unwrap();
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains(' '));
        assert_eq!(
            percent_decode_str(encoded).decode_utf8().unwrap(),
            "1+1 & ğüşİ"
        );
    }

    #[test]
    fn link_requires_phone() {
        assert_eq!(whatsapp_link("", "hi"), Err(OrderError::NoPhone));
        assert_eq!(whatsapp_link("abc", "hi"), Err(OrderError::NoPhone));
    }

    #[test]
    fn draft_reports_first_missing_field() {
        let err = OrderDraft::default().into_intent().unwrap_err();
        assert_eq!(err, OrderError::Missing("origin"));
    }

    #[test]
    fn load_state_transitions() {
        let mut s: LoadState<Vec<&str>> = LoadState::default();
        s.finish::<String>(Ok(vec!["ignored"]));
        assert_eq!(s, LoadState::Idle);
        s.start();
        assert!(s.is_loading());
        s.finish::<String>(Ok(vec!["Moda"]));
        assert_eq!(s.loaded(), Some(&vec!["Moda"]));
        s.start();
        s.finish(Err::<Vec<&str>, _>("timeout"));
        assert_eq!(s, LoadState::Failed("timeout".into()));
    }
}
