use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Registration success appends the event id to the user's joined list after
/// this delay, and the wizard closes after a further [`CLOSE_DELAY`].
pub const JOIN_DELAY: Duration = Duration::from_millis(1000);
pub const CLOSE_DELAY: Duration = Duration::from_millis(1500);

/// A catalog entry. Read-only: registration never mutates the event, it only
/// appends the event id to the user's joined-events list.
#[derive(Debug, Clone, Serialize)]
pub struct CampusEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub location: String,
    pub banner: String,
    pub is_external: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventTab {
    Campus,
    External,
}

pub fn seed_events() -> Vec<CampusEvent> {
    let event = |id: &str,
                 title: &str,
                 description: &str,
                 date: &str,
                 time: &str,
                 location: &str,
                 banner: &str,
                 is_external: bool| CampusEvent {
        id: id.into(),
        title: title.into(),
        description: description.into(),
        date: date.into(),
        time: time.into(),
        location: location.into(),
        banner: banner.into(),
        is_external,
    };

    vec![
        event(
            "e1",
            "Hackathon 2024",
            "A 24-hour coding challenge for all students. Build innovative solutions for real-world problems. Exciting prizes and internships.",
            "Oct 15, 2024",
            "09:00 AM",
            "Main Hall",
            "https://images.unsplash.com/photo-1504384308090-c894fdcc538d?auto=format&fit=crop&q=80&w=1000",
            false,
        ),
        event(
            "e2",
            "TEDx University",
            "Ideas worth spreading. Alumni speakers share journeys from college to successful careers in tech, art, and science.",
            "Nov 02, 2024",
            "02:00 PM",
            "Auditorium A",
            "https://images.unsplash.com/photo-1475721027785-f74eccf877e2?auto=format&fit=crop&q=80&w=1000",
            false,
        ),
        event(
            "e3",
            "AI & Data Science Bootcamp",
            "Hands-on bootcamp covering AI, ML, and real-world data science projects with industry mentors.",
            "Oct 28, 2024",
            "10:00 AM",
            "Computer Lab 1",
            "https://images.unsplash.com/photo-1555949963-aa79dcee981c?auto=format&fit=crop&q=80&w=1000",
            false,
        ),
        event(
            "e5",
            "UI/UX Design Workshop",
            "Interactive workshop on modern UI/UX principles, Figma basics, and real project design.",
            "Oct 22, 2024",
            "01:00 PM",
            "Design Studio",
            "https://images.unsplash.com/photo-1558655146-d09347e92766?auto=format&fit=crop&q=80&w=1000",
            false,
        ),
        event(
            "e7",
            "National Level Hackathon",
            "48-hour national hackathon hosted by a tech company. Open to students across India.",
            "Nov 18, 2024",
            "09:00 AM",
            "Bangalore Tech Park",
            "https://images.unsplash.com/photo-1518770660439-4636190af475?auto=format&fit=crop&q=80&w=1000",
            true,
        ),
        event(
            "e8",
            "Google DevFest",
            "Developer-focused conference featuring Google technologies, workshops, and networking.",
            "Dec 01, 2024",
            "10:00 AM",
            "Hyderabad Convention Center",
            "https://images.unsplash.com/photo-1522199710521-72d69614c702?auto=format&fit=crop&q=80&w=1000",
            true,
        ),
    ]
}

/// Tab plus case-insensitive title/description search, in catalog order.
pub fn filter_events<'a>(
    events: &'a [CampusEvent],
    tab: EventTab,
    query: &str,
) -> Vec<&'a CampusEvent> {
    let needle = query.trim().to_lowercase();
    events
        .iter()
        .filter(|e| match tab {
            EventTab::Campus => !e.is_external,
            EventTab::External => e.is_external,
        })
        .filter(|e| {
            needle.is_empty()
                || e.title.to_lowercase().contains(&needle)
                || e.description.to_lowercase().contains(&needle)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegStep {
    Details,
    Role,
    Form,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantRole {
    Participant,
    Organizer,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub team_name: String,
    #[serde(default)]
    pub college: String,
    #[serde(default)]
    pub area: String,
}

/// The linear registration flow: details → role → form → success. There are
/// no backward transitions; abandoning the wizard mid-flow simply discards
/// it, with no side effects.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationWizard {
    pub event_id: String,
    pub step: RegStep,
    pub role: Option<ParticipantRole>,
    pub form: Option<RegistrationForm>,
}

impl RegistrationWizard {
    pub fn start(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            step: RegStep::Details,
            role: None,
            form: None,
        }
    }

    pub fn continue_to_role(&mut self) -> Result<()> {
        if self.step != RegStep::Details {
            bail!("cannot continue from {:?}", self.step);
        }
        self.step = RegStep::Role;
        Ok(())
    }

    pub fn choose_role(&mut self, role: ParticipantRole) -> Result<()> {
        if self.step != RegStep::Role {
            bail!("cannot choose a role from {:?}", self.step);
        }
        self.role = Some(role);
        self.step = RegStep::Form;
        Ok(())
    }

    /// Submit the form and enter the terminal `success` state. The caller
    /// owns the delayed joined-events append; registering again for the same
    /// event appends the id again (repeat registration is not deduplicated).
    pub fn submit(&mut self, form: RegistrationForm) -> Result<()> {
        if self.step != RegStep::Form {
            bail!("cannot submit from {:?}", self.step);
        }
        self.form = Some(form);
        self.step = RegStep::Success;
        Ok(())
    }
}
