use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

const DEFAULT_EXPRESSION: &str = "d20";
const MAX_DICE: u8 = 10;
const MIN_SIDES: u16 = 2;
const MAX_SIDES: u16 = 100;
const MAX_MODIFIER: i32 = 1000;

static EXPRESSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d*)\s*[dD]\s*(\d+)\s*(?:([+-])\s*(\d+))?$").expect("valid dice regex")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RollError {
    #[error("expected something like 2d6+3")]
    Malformed,
    #[error("roll between 1 and {} dice", MAX_DICE)]
    DiceCount,
    #[error("dice need between {} and {} sides", MIN_SIDES, MAX_SIDES)]
    Sides,
    #[error("the modifier must be at most {}", MAX_MODIFIER)]
    Modifier,
}

/// A dice expression such as `3d6+2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roll {
    pub dice: u8,
    pub sides: u16,
    pub modifier: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub rolls: Vec<u16>,
    pub total: i32,
}

impl std::str::FromStr for Roll {
    type Err = RollError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let captures = EXPRESSION
            .captures(expression.trim())
            .ok_or(RollError::Malformed)?;

        let dice = match &captures[1] {
            "" => 1,
            count => count.parse::<u8>().map_err(|_| RollError::DiceCount)?,
        };
        if !(1..=MAX_DICE).contains(&dice) {
            return Err(RollError::DiceCount);
        }

        let sides = captures[2].parse::<u16>().map_err(|_| RollError::Sides)?;
        if !(MIN_SIDES..=MAX_SIDES).contains(&sides) {
            return Err(RollError::Sides);
        }

        let modifier = match (captures.get(3), captures.get(4)) {
            (Some(sign), Some(amount)) => {
                let amount = amount
                    .as_str()
                    .parse::<i32>()
                    .map_err(|_| RollError::Modifier)?;
                if amount > MAX_MODIFIER {
                    return Err(RollError::Modifier);
                }
                if sign.as_str() == "-" {
                    -amount
                } else {
                    amount
                }
            }
            _ => 0,
        };

        Ok(Roll {
            dice,
            sides,
            modifier,
        })
    }
}

impl std::fmt::Display for Roll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}d{}", self.dice, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}

impl Roll {
    pub fn evaluate(&self, rng: &mut impl Rng) -> Outcome {
        let rolls: Vec<u16> = (0..self.dice)
            .map(|_| rng.gen_range(1..=self.sides))
            .collect();
        let total = rolls.iter().map(|r| i32::from(*r)).sum::<i32>() + self.modifier;
        Outcome { rolls, total }
    }
}

pub mod commands {
    use super::{Roll, DEFAULT_EXPRESSION};
    use crate::{Context, Error};

    use poise::serenity_prelude::Mentionable;

    /// Roll the dice!
    ///
    /// Takes a dice expression such as `d20`, `3d6` or `2d8+4`. Defaults to a
    /// single d20. Up to 10 dice with 2 to 100 sides each.
    #[poise::command(slash_command)]
    pub async fn roll(
        ctx: Context<'_>,
        #[description = "Dice expression (e.g. 2d6+3)"] expression: Option<String>,
    ) -> Result<(), Error> {
        let expression = expression.unwrap_or_else(|| DEFAULT_EXPRESSION.to_string());

        let roll: Roll = match expression.parse() {
            Ok(roll) => roll,
            Err(e) => {
                ctx.send(
                    poise::CreateReply::default()
                        .content(format!("🔥 Invalid expression: {e}."))
                        .ephemeral(true),
                )
                .await?;
                return Ok(());
            }
        };

        let outcome = roll.evaluate(&mut rand::thread_rng());
        let results_str = outcome
            .rolls
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        ctx.say(format!(
            "🎲 {} rolled {roll}: [{results_str}] = **{}**",
            ctx.author().mention(),
            outcome.total
        ))
        .await?;

        Ok(())
    }
}
