use crate::submission::character::Character;
use crate::submission::modal::{SheetModal, MAX_SHEET_LEN};
use crate::submission::queries::{
    delete_character_by_name, get_character_by_name, get_character_names_for_user,
    get_characters_for_user, insert_character, is_name_taken, search_characters,
    update_character,
};
use crate::submission::{
    Event, FieldError, State, Step, Submission, SubmissionError, SubmissionResult,
};
use crate::{ApplicationContext, Context, Error};

use poise::serenity_prelude as serenity;
use poise::serenity_prelude::Mentionable;
use poise::CreateReply;
use sqlx::PgPool;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const EMBED_DESCRIPTION_LEN: usize = 4096;
const EMBED_FIELD_LEN: usize = 1024;
const MAX_EMBED_FIELDS: usize = 25;
const SEARCH_EMBED_BUDGET: usize = 5000;

/// Discord invalidates a command's interaction token this long after it ran.
const INTERACTION_LIFETIME: Duration = Duration::from_secs(15 * 60);
/// Left over at the end of a session for the closing replies.
const REPLY_MARGIN: Duration = Duration::from_secs(30);

async fn err_say(ctx: &Context<'_>, message: &str) -> Result<(), Error> {
    ctx.send(
        CreateReply::default()
            .content(format!("🔥 {message}"))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

fn too_long_message() -> String {
    format!(
        "This sheet is too long to edit in a form, which holds at most {MAX_SHEET_LEN} characters."
    )
}

async fn autocomplete_template<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
    ctx.data().catalog.suggest(partial).into_iter()
}

async fn autocomplete_own_character<'a>(
    ctx: Context<'_>,
    partial: &'a str,
) -> impl Iterator<Item = String> + 'a {
    let user_id = ctx.author().id.get();
    let names = get_character_names_for_user(user_id, ctx.data().database.clone())
        .await
        .inspect_err(|e| warn!("Could not list characters of user {}: {:?}", user_id, e))
        .unwrap_or_default();
    let partial = partial.to_lowercase();

    names
        .into_iter()
        .filter(|name| name.to_lowercase().contains(&partial))
        .take(25)
        .collect::<Vec<_>>()
        .into_iter()
}

/// The user's character names, leaving out `except` (compared without case).
async fn names_taken_by(
    user_id: u64,
    except: Option<&str>,
    pool: PgPool,
) -> Result<Vec<String>, sqlx::Error> {
    let except = except.map(str::to_lowercase);
    Ok(get_character_names_for_user(user_id, pool)
        .await?
        .into_iter()
        .filter(|name| except.as_deref() != Some(name.to_lowercase().as_str()))
        .collect())
}

fn describe_errors(errors: &[FieldError]) -> String {
    let mut lines = vec!["🔥 Your sheet needs a few fixes:".to_string()];
    lines.extend(
        errors
            .iter()
            .map(|error| format!("- **{}** {}", error.field, error.reason)),
    );
    lines.join("\n")
}

fn retry_buttons(edit_id: &str, discard_id: &str) -> serenity::CreateActionRow {
    serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new(edit_id)
            .label("Edit sheet")
            .style(serenity::ButtonStyle::Primary),
        serenity::CreateButton::new(discard_id)
            .label("Discard")
            .style(serenity::ButtonStyle::Danger),
    ])
}

/// How long a session may wait on the user in total.
fn session_budget(configured: Duration) -> Duration {
    configured.min(INTERACTION_LIFETIME - REPLY_MARGIN)
}

/// A user's run through the sheet form.
///
/// Every wait draws on one deadline taken when the command started, so the
/// command's interaction token is still valid for the replies that follow.
/// A rejected sheet is answered with the field errors and two buttons: one
/// re-opens the form with what the user typed, the other discards it.
struct SheetSession<'a> {
    ctx: ApplicationContext<'a>,
    verb: &'static str,
    deadline: Instant,
    edit_id: String,
    discard_id: String,
    prompt: Option<poise::ReplyHandle<'a>>,
}

impl<'a> SheetSession<'a> {
    fn new(ctx: ApplicationContext<'a>, verb: &'static str) -> Self {
        let any_ctx = poise::Context::Application(ctx);
        let budget = session_budget(any_ctx.data().config.submission_timeout);

        SheetSession {
            ctx,
            verb,
            deadline: Instant::now() + budget,
            edit_id: format!("{}-edit", any_ctx.id()),
            discard_id: format!("{}-discard", any_ctx.id()),
            prompt: None,
        }
    }

    fn any_ctx(&self) -> Context<'a> {
        poise::Context::Application(self.ctx)
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Answers the command with the form and runs the submission to its end.
    async fn open(
        &mut self,
        submission: &mut Submission,
    ) -> Result<Option<SubmissionResult>, Error> {
        let Some(modal) = SheetModal::draft(submission, self.verb) else {
            err_say(&self.any_ctx(), &too_long_message()).await?;
            submission.cancel()?;
            return Ok(None);
        };

        let event = match poise::execute_modal(self.ctx, Some(modal), Some(self.remaining()))
            .await?
        {
            Some(modal) => Event::Submitted(modal.sheet),
            None => Event::TimedOut,
        };
        self.drive(submission, event).await
    }

    /// Confirms a reopened submission, going back to the user if it no
    /// longer passes.
    async fn confirm_again(
        &mut self,
        submission: &mut Submission,
    ) -> Result<Option<SubmissionResult>, Error> {
        let data = self.any_ctx().data();

        match submission.confirm(&data.registry) {
            Ok(result) => Ok(Some(result)),
            Err(SubmissionError::Invalid(errors)) => {
                let event = self.ask_to_retry(submission, &errors).await?;
                self.drive(submission, event).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn drive(
        &mut self,
        submission: &mut Submission,
        mut event: Event,
    ) -> Result<Option<SubmissionResult>, Error> {
        let data = self.any_ctx().data();

        loop {
            let errors = match submission.handle(event, &data.registry)? {
                Step::Confirmed(result) => return Ok(Some(result)),
                Step::Closed(state) => {
                    debug!(
                        "Submission by user {} closed as {:?}",
                        submission.author_id(),
                        state
                    );
                    let content = match state {
                        State::Cancelled => "🧹 Submission discarded.",
                        _ => "⌛ This submission has expired.",
                    };
                    self.settle(content).await;
                    return Ok(None);
                }
                Step::Retry(errors) => errors,
            };

            debug!(
                "Sheet by user {} rejected with {} error(s)",
                submission.author_id(),
                errors.len()
            );
            event = self.ask_to_retry(submission, &errors).await?;
        }
    }

    /// Shows the errors with Edit and Discard buttons and turns the user's
    /// choice into the next event.
    async fn ask_to_retry(
        &mut self,
        submission: &Submission,
        errors: &[FieldError],
    ) -> Result<Event, Error> {
        let any_ctx = self.any_ctx();
        if self.remaining().is_zero() {
            return Ok(Event::TimedOut);
        }

        let reply = CreateReply::default()
            .content(describe_errors(errors))
            .components(vec![retry_buttons(&self.edit_id, &self.discard_id)])
            .ephemeral(true);
        let shown = match self.prompt.take() {
            Some(handle) => {
                let edited = handle.edit(any_ctx, reply).await;
                self.prompt = Some(handle);
                edited
            }
            None => any_ctx.send(reply).await.map(|handle| {
                self.prompt = Some(handle);
            }),
        };
        if let Err(e) = shown {
            warn!(
                "Could not show sheet errors to user {}: {:?}",
                submission.author_id(),
                e
            );
            return Ok(Event::TimedOut);
        }

        let button_ids = [self.edit_id.clone(), self.discard_id.clone()];
        let press = serenity::ComponentInteractionCollector::new(any_ctx)
            .author_id(any_ctx.author().id)
            .filter(move |press| button_ids.contains(&press.data.custom_id))
            .timeout(self.remaining())
            .await;
        let Some(press) = press else {
            return Ok(Event::TimedOut);
        };

        if press.data.custom_id == self.discard_id {
            let acknowledged = press
                .create_response(
                    any_ctx.serenity_context(),
                    serenity::CreateInteractionResponse::Acknowledge,
                )
                .await;
            if let Err(e) = acknowledged {
                warn!("Could not acknowledge discard: {:?}", e);
            }
            return Ok(Event::Cancelled);
        }

        let Some(modal) = SheetModal::draft(submission, self.verb) else {
            let message = serenity::CreateInteractionResponseMessage::new()
                .content(format!("🔥 {}", too_long_message()))
                .ephemeral(true);
            press
                .create_response(
                    any_ctx.serenity_context(),
                    serenity::CreateInteractionResponse::Message(message),
                )
                .await?;
            return Ok(Event::Cancelled);
        };

        let remaining = self.remaining();
        Ok(
            match poise::execute_modal_on_component_interaction(
                any_ctx,
                press,
                Some(modal),
                Some(remaining),
            )
            .await?
            {
                Some(modal) => Event::Submitted(modal.sheet),
                None => Event::TimedOut,
            },
        )
    }

    /// Replaces the retry prompt, if one was shown, with a closing note.
    async fn settle(&mut self, content: &str) {
        let Some(prompt) = self.prompt.take() else {
            return;
        };
        let reply = CreateReply::default().content(content).components(vec![]);
        if let Err(e) = prompt.edit(self.any_ctx(), reply).await {
            warn!("Could not close the sheet prompt: {:?}", e);
        }
    }
}

/// Opens a submission, replying with an apology when the template is gone.
async fn open_submission(
    ctx: &Context<'_>,
    template: &str,
) -> Result<Option<Submission>, Error> {
    match Submission::open(&ctx.data().catalog, template, ctx.author().id.get()) {
        Ok(submission) => Ok(Some(submission)),
        Err(SubmissionError::TemplateNotFound(e)) => {
            warn!("User {} asked for missing {}", ctx.author().id, e);
            err_say(ctx, &format!("Sorry, there is no {:?} sheet.", e.name)).await?;
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Manage your characters.
#[poise::command(
    slash_command,
    rename = "oc",
    subcommands("create", "update", "list", "read", "search", "delete"),
    subcommand_required
)]
pub async fn character(_: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Register a new character.
///
/// Opens a form pre-filled with the chosen sheet template. Fill in each field
/// after its label and submit; if something is off you can edit the sheet
/// again or discard it.
#[poise::command(slash_command)]
pub async fn create(
    ctx: ApplicationContext<'_>,
    #[description = "Sheet template (Normal, Angel or Demon)"]
    #[autocomplete = "autocomplete_template"]
    template: String,
) -> Result<(), Error> {
    let mut session = SheetSession::new(ctx, "Create");
    let any_ctx = poise::Context::Application(ctx);
    let data = any_ctx.data();
    let user_id = any_ctx.author().id.get();

    let Some(submission) = open_submission(&any_ctx, &template).await? else {
        return Ok(());
    };
    let taken = names_taken_by(user_id, None, data.database.clone()).await?;
    let mut submission = submission.with_taken_names(taken);

    let mut outcome = session.open(&mut submission).await?;
    let (id, result) = loop {
        let Some(result) = outcome else {
            return Ok(());
        };
        match insert_character(&result, data.database.clone()).await {
            Ok(id) => break (id, result),
            Err(e) if is_name_taken(&e) => {
                debug!(
                    "Name {:?} was taken while user {} filled the sheet",
                    result.name(),
                    user_id
                );
                let taken = names_taken_by(user_id, None, data.database.clone()).await?;
                submission = Submission::reopen(&data.catalog, &result)?.with_taken_names(taken);
                outcome = session.confirm_again(&mut submission).await?;
            }
            Err(e) => return Err(e.into()),
        }
    };

    let character = Character::from_submission(id, &result);
    info!(
        "User {} registered {:?} ({}) from the {} sheet",
        user_id, character.name, id, character.template
    );
    session.settle("✅ Sheet accepted.").await;

    let content = format!("📜 Registered {:?}", character.name);
    let reply = CreateReply::default()
        .content(&content)
        .embed(character.embed(&data.catalog));
    if let Err(e) = any_ctx.send(reply).await {
        warn!("Could not reply for character {}: {:?}", id, e);
        let message = serenity::CreateMessage::new()
            .content(format!("{} {content}", any_ctx.author().id.mention()))
            .embed(character.embed(&data.catalog));
        if let Err(e) = any_ctx
            .channel_id()
            .send_message(any_ctx.serenity_context(), message)
            .await
        {
            warn!("Could not announce character {}: {:?}", id, e);
        }
    }

    Ok(())
}

/// Edit one of your characters.
///
/// Opens the sheet form pre-filled with the character's current sheet.
#[poise::command(slash_command)]
pub async fn update(
    ctx: ApplicationContext<'_>,
    #[description = "Name of your character"]
    #[autocomplete = "autocomplete_own_character"]
    name: String,
) -> Result<(), Error> {
    let mut session = SheetSession::new(ctx, "Update");
    let any_ctx = poise::Context::Application(ctx);
    let data = any_ctx.data();
    let user_id = any_ctx.author().id.get();

    let character = match get_character_by_name(user_id, &name, data.database.clone()).await? {
        Some(character) => character,
        None => {
            err_say(&any_ctx, &format!("You don't have a character named {name:?}.")).await?;
            return Ok(());
        }
    };

    let Some(submission) = open_submission(&any_ctx, &character.template).await? else {
        return Ok(());
    };
    let own_name = Some(character.name.as_str());
    let taken = names_taken_by(user_id, own_name, data.database.clone()).await?;
    let mut submission = submission.with_taken_names(taken);
    for (label, value) in &character.fields {
        if submission.template().field(label).is_some() {
            submission.fill(label, value)?;
        }
    }

    let mut outcome = session.open(&mut submission).await?;
    let result = loop {
        let Some(result) = outcome else {
            return Ok(());
        };
        match update_character(character.id, &result, data.database.clone()).await {
            Ok(true) => break result,
            Ok(false) => {
                session.settle("🧹 Submission closed.").await;
                err_say(&any_ctx, "That character no longer exists.").await?;
                return Ok(());
            }
            Err(e) if is_name_taken(&e) => {
                let taken = names_taken_by(user_id, own_name, data.database.clone()).await?;
                submission = Submission::reopen(&data.catalog, &result)?.with_taken_names(taken);
                outcome = session.confirm_again(&mut submission).await?;
            }
            Err(e) => return Err(e.into()),
        }
    };

    let updated = Character::from_submission(character.id, &result);
    info!("User {} updated {:?} ({})", user_id, updated.name, updated.id);
    session.settle("✅ Sheet accepted.").await;

    let reply = CreateReply::default()
        .content(format!("✏️ Updated {:?}", updated.name))
        .embed(updated.embed(&data.catalog))
        .ephemeral(true);
    if let Err(e) = any_ctx.send(reply).await {
        warn!("Could not confirm update of {}: {:?}", updated.id, e);
    }

    Ok(())
}

fn characters_embed(user: &serenity::User, characters: &[Character]) -> serenity::CreateEmbed {
    let description = if characters.is_empty() {
        "Doesn't have any characters.".to_string()
    } else {
        characters
            .iter()
            .map(|character| format!("* {}", character.display_name()))
            .collect::<Vec<_>>()
            .join("\n")
            .chars()
            .take(EMBED_DESCRIPTION_LEN)
            .collect()
    };

    serenity::CreateEmbed::new()
        .title("Characters")
        .author(serenity::CreateEmbedAuthor::new(&user.name).icon_url(user.face()))
        .description(description)
}

async fn send_list(ctx: Context<'_>, user: &serenity::User) -> Result<(), Error> {
    let characters = get_characters_for_user(user.id.get(), ctx.data().database.clone()).await?;

    ctx.send(
        CreateReply::default()
            .embed(characters_embed(user, &characters))
            .ephemeral(true),
    )
    .await?;

    Ok(())
}

/// List someone's characters.
#[poise::command(slash_command)]
pub async fn list(
    ctx: Context<'_>,
    #[description = "Whose characters to list (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let user = user.as_ref().unwrap_or_else(|| ctx.author());
    send_list(ctx, user).await
}

/// List this member's characters.
#[poise::command(context_menu_command = "See list")]
pub async fn list_menu(ctx: Context<'_>, user: serenity::User) -> Result<(), Error> {
    send_list(ctx, &user).await
}

/// Show a character.
#[poise::command(slash_command)]
pub async fn read(
    ctx: Context<'_>,
    #[description = "Name of the character"]
    #[autocomplete = "autocomplete_own_character"]
    name: String,
    #[description = "Who owns the character (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let owner = user.as_ref().unwrap_or_else(|| ctx.author());

    match get_character_by_name(owner.id.get(), &name, ctx.data().database.clone()).await? {
        Some(character) => {
            ctx.send(
                CreateReply::default()
                    .embed(character.embed(&ctx.data().catalog))
                    .ephemeral(true),
            )
            .await?;
        }
        None if owner.id == ctx.author().id => {
            err_say(&ctx, &format!("You don't have a character named {name:?}.")).await?
        }
        None => {
            err_say(
                &ctx,
                &format!("{} doesn't have a character named {name:?}.", owner.name),
            )
            .await?
        }
    }

    Ok(())
}

/// Lists of matching characters, one per owner, sized for a single embed.
fn owner_fields(characters: &[Character], budget: usize) -> Vec<(u64, String)> {
    let mut fields: Vec<(u64, String)> = Vec::new();
    let mut used = 0;

    for character in characters {
        let line = format!("* {}", character.display_name());
        let line_len = line.chars().count();

        match fields.last_mut() {
            Some((owner, listing)) if *owner == character.user_id => {
                let listing_len = listing.chars().count();
                if listing_len + 1 + line_len <= EMBED_FIELD_LEN && used + 1 + line_len <= budget {
                    listing.push('\n');
                    listing.push_str(&line);
                    used += 1 + line_len;
                }
            }
            _ => {
                if fields.len() == MAX_EMBED_FIELDS || used + line_len > budget {
                    break;
                }
                fields.push((character.user_id, line));
                used += line_len;
            }
        }
    }

    fields
}

/// Search characters by name.
#[poise::command(slash_command)]
pub async fn search(
    ctx: Context<'_>,
    #[description = "Part of the character's name"] query: String,
    #[description = "Only search this member's characters"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let owner_id = user.as_ref().map(|user| user.id.get());
    let characters = search_characters(&query, owner_id, ctx.data().database.clone()).await?;

    if characters.is_empty() {
        err_say(&ctx, "No characters found.").await?;
        return Ok(());
    }

    let mut embed = serenity::CreateEmbed::new().title("Characters");
    if let Some(user) = &user {
        embed = embed.author(serenity::CreateEmbedAuthor::new(&user.name).icon_url(user.face()));
    }
    for (owner, listing) in owner_fields(&characters, SEARCH_EMBED_BUDGET) {
        let owner_name = match serenity::UserId::new(owner).to_user(ctx.serenity_context()).await {
            Ok(user) => user.name,
            Err(e) => {
                debug!("Could not look up user {}: {:?}", owner, e);
                owner.to_string()
            }
        };
        embed = embed.field(owner_name, listing, false);
    }

    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;

    Ok(())
}

/// Delete one of your characters.
#[poise::command(slash_command)]
pub async fn delete(
    ctx: Context<'_>,
    #[description = "Name of your character"]
    #[autocomplete = "autocomplete_own_character"]
    name: String,
) -> Result<(), Error> {
    let user_id = ctx.author().id.get();

    match delete_character_by_name(user_id, &name, ctx.data().database.clone()).await? {
        Some(character) => {
            info!("User {} deleted {:?} ({})", user_id, character.name, character.id);
            ctx.send(
                CreateReply::default()
                    .content(format!("🗑️ Deleted {:?}", character.name))
                    .embed(character.embed(&ctx.data().catalog))
                    .ephemeral(true),
            )
            .await?;
        }
        None => err_say(&ctx, &format!("You don't have a character named {name:?}.")).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::FieldErrorReason;
    use uuid::Uuid;

    fn character(user_id: u64, name: &str) -> Character {
        Character {
            id: Uuid::nil(),
            user_id,
            template: "Normal".to_string(),
            name: name.to_string(),
            fields: vec![("Species".to_string(), "Eevee".to_string())],
        }
    }

    #[test]
    fn errors_are_listed_per_field() {
        let errors = vec![
            FieldError {
                field: "Kind".to_string(),
                reason: FieldErrorReason::Missing,
            },
            FieldError {
                field: "Pet".to_string(),
                reason: FieldErrorReason::Unknown,
            },
        ];

        assert_eq!(
            describe_errors(&errors),
            "🔥 Your sheet needs a few fixes:\n- **Kind** is required\n- **Pet** is not part of this sheet"
        );
    }

    #[test]
    fn session_never_outlives_the_interaction_token() {
        assert_eq!(
            session_budget(Duration::from_secs(900)),
            Duration::from_secs(870)
        );
        assert_eq!(
            session_budget(Duration::from_secs(60)),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn search_results_are_grouped_per_owner() {
        // arrange
        let characters = vec![
            character(1, "Aster"),
            character(1, "Bramble"),
            character(2, "Cinder"),
        ];

        // act
        let fields = owner_fields(&characters, SEARCH_EMBED_BUDGET);

        // assert
        assert_eq!(
            fields,
            vec![
                (1, "* 000〙Aster《Eevee》\n* 000〙Bramble《Eevee》".to_string()),
                (2, "* 000〙Cinder《Eevee》".to_string()),
            ]
        );
    }

    #[test]
    fn search_results_stop_at_the_embed_limits() {
        // arrange
        let many_owners: Vec<_> = (0..30).map(|owner| character(owner, "Aster")).collect();
        let one_owner: Vec<_> = (0..100).map(|_| character(1, "Aster")).collect();

        // act
        let per_owner = owner_fields(&many_owners, SEARCH_EMBED_BUDGET);
        let single = owner_fields(&one_owner, SEARCH_EMBED_BUDGET);
        let tight = owner_fields(&many_owners, 40);

        // assert
        assert_eq!(per_owner.len(), MAX_EMBED_FIELDS);
        assert_eq!(single.len(), 1);
        assert!(single[0].1.chars().count() <= EMBED_FIELD_LEN);
        assert_eq!(tight.len(), 2);
    }
}
