use crate::submission::Submission;
use poise::serenity_prelude as serenity;

const SHEET_INPUT_ID: &str = "sheet";
const MAX_TITLE_LEN: usize = 45;
pub const MAX_SHEET_LEN: u16 = 4000;

/// The sheet form: a single paragraph input pre-filled with the draft sheet.
///
/// Discord caps modals at five inputs, so the whole sheet travels as one
/// markdown text and is split into fields by the template on submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetModal {
    pub title: String,
    pub sheet: String,
}

impl SheetModal {
    /// The form for the submission's current draft, or `None` when the draft
    /// cannot fit in the sheet input.
    pub fn draft(submission: &Submission, verb: &str) -> Option<Self> {
        Some(SheetModal {
            title: format!("{verb} {}", submission.template().title()),
            sheet: submission.draft_within(MAX_SHEET_LEN as usize)?,
        })
    }
}

impl Default for SheetModal {
    fn default() -> Self {
        SheetModal {
            title: "Character Sheet".to_string(),
            sheet: String::new(),
        }
    }
}

impl poise::Modal for SheetModal {
    fn create(defaults: Option<Self>, custom_id: String) -> serenity::CreateInteractionResponse {
        let SheetModal { title, sheet } = defaults.unwrap_or_default();
        let title: String = title.chars().take(MAX_TITLE_LEN).collect();

        let style = serenity::InputTextStyle::Paragraph;
        let mut input = serenity::CreateInputText::new(style, "Sheet", SHEET_INPUT_ID)
            .placeholder("Fill in each field after its label.")
            .max_length(MAX_SHEET_LEN)
            .required(true);
        if !sheet.is_empty() {
            input = input.value(sheet);
        }

        serenity::CreateInteractionResponse::Modal(
            serenity::CreateModal::new(custom_id, title)
                .components(vec![serenity::CreateActionRow::InputText(input)]),
        )
    }

    fn parse(data: serenity::ModalInteractionData) -> Result<Self, &'static str> {
        let sheet = data
            .components
            .into_iter()
            .flat_map(|row| row.components)
            .find_map(|component| match component {
                serenity::ActionRowComponent::InputText(input)
                    if input.custom_id == SHEET_INPUT_ID =>
                {
                    Some(input.value.unwrap_or_default())
                }
                _ => None,
            })
            .ok_or("sheet input missing from modal submission")?;

        Ok(SheetModal {
            sheet,
            ..SheetModal::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::Catalog;

    #[test]
    fn oversized_draft_gets_no_form() {
        // arrange
        let catalog = Catalog::builtin();
        let mut submission = Submission::open(&catalog, "Normal", 1).unwrap();
        submission.fill("Information", &"a".repeat(4100)).unwrap();

        // act
        let modal = SheetModal::draft(&submission, "Update");

        // assert
        assert_eq!(modal, None);
    }

    #[test]
    fn blank_draft_is_titled_after_the_template() {
        let catalog = Catalog::builtin();
        let submission = Submission::open(&catalog, "Angel", 1).unwrap();

        let modal = SheetModal::draft(&submission, "Create").unwrap();

        assert_eq!(modal.title, "Create Angel Character");
        assert_eq!(modal.sheet, submission.draft());
    }
}
