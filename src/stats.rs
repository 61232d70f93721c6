/// A stat preset. Each preset fixes the six base stats of a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    Eevee,
    Vaporeon,
    Jolteon,
    Flareon,
    Espeon,
    Umbreon,
    Leafeon,
    Glaceon,
    Sylveon,
}

impl Stat {
    pub const ALL: [Stat; 9] = [
        Stat::Eevee,
        Stat::Vaporeon,
        Stat::Jolteon,
        Stat::Flareon,
        Stat::Espeon,
        Stat::Umbreon,
        Stat::Leafeon,
        Stat::Glaceon,
        Stat::Sylveon,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stat::Eevee => "Eevee",
            Stat::Vaporeon => "Vaporeon",
            Stat::Jolteon => "Jolteon",
            Stat::Flareon => "Flareon",
            Stat::Espeon => "Espeon",
            Stat::Umbreon => "Umbreon",
            Stat::Leafeon => "Leafeon",
            Stat::Glaceon => "Glaceon",
            Stat::Sylveon => "Sylveon",
        }
    }

    /// HP, Attack, Defense, Sp. Attack, Sp. Defense, Speed.
    pub fn base_stats(self) -> [u16; 6] {
        match self {
            Stat::Eevee => [55, 55, 50, 45, 65, 55],
            Stat::Vaporeon => [130, 65, 60, 110, 95, 65],
            Stat::Jolteon => [65, 65, 60, 110, 95, 130],
            Stat::Flareon => [65, 130, 60, 95, 110, 65],
            Stat::Espeon => [65, 65, 60, 130, 95, 110],
            Stat::Umbreon => [95, 65, 110, 60, 130, 65],
            Stat::Leafeon => [65, 110, 130, 60, 65, 95],
            Stat::Glaceon => [65, 60, 110, 130, 95, 65],
            Stat::Sylveon => [95, 65, 65, 110, 130, 60],
        }
    }
}

impl std::fmt::Display for Stat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Character classification, worth a fixed amount of points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Basic,
    Middle,
    Final,
    HybridLegendary,
    PureLegendary,
}

impl Kind {
    pub const ALL: [Kind; 5] = [
        Kind::Basic,
        Kind::Middle,
        Kind::Final,
        Kind::HybridLegendary,
        Kind::PureLegendary,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Kind::Basic => "Basic",
            Kind::Middle => "Middle",
            Kind::Final => "Final",
            Kind::HybridLegendary => "Hybrid Legendary",
            Kind::PureLegendary => "Pure Legendary",
        }
    }

    pub fn points(self) -> u8 {
        match self {
            Kind::Basic => 11,
            Kind::Middle => 15,
            Kind::Final => 20,
            Kind::HybridLegendary => 25,
            Kind::PureLegendary => 30,
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Lowercases and folds `_`, `-` and whitespace runs into single spaces.
fn normalize(name: &str) -> String {
    name.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read-only view over the valid [`Stat`] and [`Kind`] values.
///
/// Built once at start-up and shared by reference with every submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct Registry;

impl Registry {
    pub fn new() -> Self {
        Registry
    }

    pub fn stats(&self) -> &'static [Stat] {
        &Stat::ALL
    }

    pub fn kinds(&self) -> &'static [Kind] {
        &Kind::ALL
    }

    pub fn stat(&self, name: &str) -> Option<Stat> {
        let name = normalize(name);
        Stat::ALL
            .into_iter()
            .find(|stat| stat.name().to_lowercase() == name)
    }

    pub fn kind(&self, name: &str) -> Option<Kind> {
        let name = normalize(name);
        Kind::ALL
            .into_iter()
            .find(|kind| kind.name().to_lowercase() == name)
    }

    pub fn is_valid_stat(&self, name: &str) -> bool {
        self.stat(name).is_some()
    }

    pub fn is_valid_kind(&self, name: &str) -> bool {
        self.kind(name).is_some()
    }

    /// Stat names containing `partial`, for autocomplete.
    pub fn suggest_stats(&self, partial: &str) -> Vec<&'static str> {
        suggest(Stat::ALL.iter().map(|stat| stat.name()), partial)
    }

    /// Kind names containing `partial`, for autocomplete.
    pub fn suggest_kinds(&self, partial: &str) -> Vec<&'static str> {
        suggest(Kind::ALL.iter().map(|kind| kind.name()), partial)
    }
}

fn suggest(names: impl Iterator<Item = &'static str>, partial: &str) -> Vec<&'static str> {
    let partial = normalize(partial);
    names
        .filter(|name| name.to_lowercase().contains(&partial))
        .collect()
}

pub mod commands {
    use crate::{Context, Error};

    async fn autocomplete_stat<'a>(
        ctx: Context<'_>,
        partial: &'a str,
    ) -> impl Iterator<Item = String> + 'a {
        ctx.data()
            .registry
            .suggest_stats(partial)
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>()
            .into_iter()
    }

    async fn autocomplete_kind<'a>(
        ctx: Context<'_>,
        partial: &'a str,
    ) -> impl Iterator<Item = String> + 'a {
        ctx.data()
            .registry
            .suggest_kinds(partial)
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Look up a stat preset or a kind.
    ///
    /// Shows the six base stats of a preset and how many points a kind is
    /// worth. Without arguments every preset and kind is listed.
    #[poise::command(slash_command)]
    pub async fn stats(
        ctx: Context<'_>,
        #[description = "Stat preset (e.g. Vaporeon)"]
        #[autocomplete = "autocomplete_stat"]
        stat: Option<String>,
        #[description = "Kind (e.g. Final)"]
        #[autocomplete = "autocomplete_kind"]
        kind: Option<String>,
    ) -> Result<(), Error> {
        let registry = &ctx.data().registry;
        let mut lines = Vec::new();

        match stat.as_deref() {
            Some(name) => match registry.stat(name) {
                Some(stat) => lines.push(stat_line(stat)),
                None => lines.push(format!("🔥 Unknown stat preset {name:?}.")),
            },
            None if kind.is_none() => lines.extend(registry.stats().iter().map(|s| stat_line(*s))),
            None => {}
        }

        match kind.as_deref() {
            Some(name) => match registry.kind(name) {
                Some(kind) => lines.push(kind_line(kind)),
                None => lines.push(format!("🔥 Unknown kind {name:?}.")),
            },
            None if stat.is_none() => lines.extend(registry.kinds().iter().map(|k| kind_line(*k))),
            None => {}
        }

        ctx.send(
            poise::CreateReply::default()
                .content(lines.join("\n"))
                .ephemeral(true),
        )
        .await?;

        Ok(())
    }

    fn stat_line(stat: super::Stat) -> String {
        let [hp, atk, def, spa, spd, spe] = stat.base_stats();
        format!(
            "**{stat}**: HP {hp} / Atk {atk} / Def {def} / SpA {spa} / SpD {spd} / Spe {spe}"
        )
    }

    fn kind_line(kind: super::Kind) -> String {
        format!("**{kind}**: {} points", kind.points())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registry_stat_is_valid() {
        let registry = Registry::new();

        for stat in registry.stats() {
            assert!(registry.is_valid_stat(stat.name()));
            assert_eq!(registry.stat(stat.name()), Some(*stat));
        }
    }

    #[test]
    fn every_registry_kind_is_valid() {
        let registry = Registry::new();

        for kind in registry.kinds() {
            assert!(registry.is_valid_kind(kind.name()));
        }
    }

    #[test]
    fn unknown_names_are_not_valid() {
        let registry = Registry::new();

        for name in ["", "Pikachu", "Eeveee", "55 55 50 45 65 55", "Legendary"] {
            assert!(!registry.is_valid_stat(name), "{name:?} accepted as stat");
            assert!(!registry.is_valid_kind(name), "{name:?} accepted as kind");
        }
    }

    #[test]
    fn lookups_ignore_case_and_separators() {
        let registry = Registry::new();

        assert_eq!(registry.stat("  vaporeon "), Some(Stat::Vaporeon));
        assert_eq!(registry.kind("hybrid_legendary"), Some(Kind::HybridLegendary));
        assert_eq!(registry.kind("PURE-legendary"), Some(Kind::PureLegendary));
        assert_eq!(registry.kind("Pure   Legendary"), Some(Kind::PureLegendary));
    }

    #[test]
    fn base_stats_match_presets() {
        assert_eq!(Stat::Eevee.base_stats(), [55, 55, 50, 45, 65, 55]);
        assert_eq!(Stat::Jolteon.base_stats()[5], 130);
        assert_eq!(Kind::Final.points(), 20);
    }

    #[test]
    fn suggestions_filter_by_substring() {
        let registry = Registry::new();

        assert_eq!(registry.suggest_stats("eon").len(), 8);
        assert_eq!(registry.suggest_kinds("legend"), vec!["Hybrid Legendary", "Pure Legendary"]);
        assert_eq!(registry.suggest_stats("").len(), Stat::ALL.len());
    }
}
