use crate::sheets::Catalog;
use crate::submission::SubmissionResult;
use poise::serenity_prelude as serenity;
use uuid::Uuid;

const DISPLAY_PART_LEN: usize = 20;
const EMBED_DESCRIPTION_LEN: usize = 4096;

/// A stored character sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
    pub id: Uuid,
    pub user_id: u64,
    pub template: String,
    pub name: String,
    pub fields: Vec<(String, String)>,
}

fn shorten(text: &str) -> String {
    if text.chars().count() > DISPLAY_PART_LEN {
        format!("{}...", text.chars().take(DISPLAY_PART_LEN).collect::<String>())
    } else {
        text.to_string()
    }
}

impl Character {
    pub fn field(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Short listing name such as `005〙Aster《Eevee》`.
    pub fn display_name(&self) -> String {
        let level = self
            .field("Level")
            .and_then(|level| {
                let digits: String = level
                    .trim()
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect();
                digits.parse::<u32>().ok()
            })
            .unwrap_or(0);

        let species = self
            .field("Species")
            .and_then(|species| species.split(['.', ',']).next())
            .map(str::trim)
            .filter(|species| !species.is_empty())
            .map(shorten)
            .unwrap_or_else(|| "Unknown".to_string());

        format!("{level:03}〙{}《{species}》", shorten(&self.name))
    }

    /// The sheet as markdown, re-rendered through its template when it still
    /// exists.
    pub fn render(&self, catalog: &Catalog) -> String {
        match catalog.get_template(&self.template) {
            Ok(template) => template.render(|label| self.field(label)),
            Err(_) => self
                .fields
                .iter()
                .filter(|(_, value)| !value.is_empty())
                .map(|(label, value)| format!("**{label}:** {value}"))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn embed(&self, catalog: &Catalog) -> serenity::CreateEmbed {
        let description: String = self
            .render(catalog)
            .chars()
            .take(EMBED_DESCRIPTION_LEN)
            .collect();

        serenity::CreateEmbed::new()
            .title(&self.name)
            .description(description)
            .footer(serenity::CreateEmbedFooter::new(format!("ID: {}", self.id)))
    }

    pub fn from_submission(id: Uuid, result: &SubmissionResult) -> Self {
        Character {
            id,
            user_id: result.author_id,
            template: result.template.clone(),
            name: result.name().to_string(),
            fields: result.fields.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn character(fields: &[(&str, &str)]) -> Character {
        Character {
            id: Uuid::nil(),
            user_id: 1,
            template: "Normal".to_string(),
            name: "Aster".to_string(),
            fields: fields
                .iter()
                .map(|(l, v)| (l.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn display_name_includes_level_and_species() {
        let oc = character(&[("Level", "5"), ("Species", "Eevee, Normal type")]);

        assert_eq!(oc.display_name(), "005〙Aster《Eevee》");
    }

    #[test]
    fn display_name_defaults_when_fields_are_blank() {
        let oc = character(&[("Level", ""), ("Species", "")]);

        assert_eq!(oc.display_name(), "000〙Aster《Unknown》");
    }

    #[test]
    fn display_name_shortens_long_species() {
        let oc = character(&[("Species", "An extremely long species name")]);

        assert_eq!(oc.display_name(), "000〙Aster《An extremely long sp...》");
    }

    #[test]
    fn render_falls_back_without_template() {
        let mut oc = character(&[("Name", "Aster"), ("Job", ""), ("Species", "Eevee")]);
        oc.template = "Retired".to_string();

        assert_eq!(
            oc.render(&Catalog::builtin()),
            "**Name:** Aster\n**Species:** Eevee"
        );
    }
}
