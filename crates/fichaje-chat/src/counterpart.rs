//! Normalized view of the other participant.
//!
//! Player profiles carry `full_name`/`photo_url`, club profiles carry
//! `club_name`/`logo_url`, and either may be missing entirely. All call
//! sites resolve through this one accessor instead of repeating the
//! fallback chain.

use fichaje_shared::{Profile, UserId};

#[derive(Debug, Clone, PartialEq)]
pub struct Counterpart {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
}

impl Counterpart {
    /// Resolve from an optionally-present profile, with default-empty
    /// fields when the lookup returned nothing.
    pub fn resolve(id: UserId, profile: Option<Profile>) -> Self {
        let profile = profile.unwrap_or_default();
        let display_name = nonempty(profile.full_name)
            .or_else(|| nonempty(profile.club_name))
            .unwrap_or_else(|| "Usuario".to_string());
        let avatar_url = nonempty(profile.photo_url).or_else(|| nonempty(profile.logo_url));
        Self {
            id,
            display_name,
            avatar_url,
            phone: nonempty(profile.phone),
            role: nonempty(profile.role),
        }
    }

    /// Avatar-placeholder initial.
    pub fn initial(&self) -> char {
        self.display_name
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('U')
    }
}

fn nonempty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn players_resolve_by_full_name_and_photo() {
        let id = UserId::new();
        let profile = Profile {
            id: Some(id),
            full_name: Some("Ana Rojas".to_string()),
            photo_url: Some("https://cdn.example/ana.jpg".to_string()),
            club_name: Some("CD Palestino".to_string()),
            logo_url: Some("https://cdn.example/logo.png".to_string()),
            ..Profile::default()
        };

        let counterpart = Counterpart::resolve(id, Some(profile));
        assert_eq!(counterpart.display_name, "Ana Rojas");
        assert_eq!(
            counterpart.avatar_url.as_deref(),
            Some("https://cdn.example/ana.jpg")
        );
        assert_eq!(counterpart.initial(), 'A');
    }

    #[test]
    fn clubs_fall_back_to_club_name_and_logo() {
        let id = UserId::new();
        let profile = Profile {
            id: Some(id),
            club_name: Some("CD Palestino".to_string()),
            logo_url: Some("https://cdn.example/logo.png".to_string()),
            ..Profile::default()
        };

        let counterpart = Counterpart::resolve(id, Some(profile));
        assert_eq!(counterpart.display_name, "CD Palestino");
        assert_eq!(
            counterpart.avatar_url.as_deref(),
            Some("https://cdn.example/logo.png")
        );
    }

    #[test]
    fn a_missing_profile_resolves_to_defaults() {
        let counterpart = Counterpart::resolve(UserId::new(), None);
        assert_eq!(counterpart.display_name, "Usuario");
        assert!(counterpart.avatar_url.is_none());
        assert!(counterpart.phone.is_none());
        assert_eq!(counterpart.initial(), 'U');
    }

    #[test]
    fn blank_strings_count_as_missing() {
        let id = UserId::new();
        let profile = Profile {
            id: Some(id),
            full_name: Some("   ".to_string()),
            club_name: Some("Unión Española".to_string()),
            ..Profile::default()
        };
        let counterpart = Counterpart::resolve(id, Some(profile));
        assert_eq!(counterpart.display_name, "Unión Española");
    }
}
