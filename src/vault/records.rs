//! Plain records handed to the persistence layer
//!
//! Field names follow the bot's long-standing storage format: `executed` is the
//! string "True"/"False" and expirations are ISO-8601 strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::account::{Account, AccountHandle};
use super::contract::{Contract, ContractCore, ContractId, ContractKind};
use super::error::{VaultError, VaultResult};
use super::group_wager::{GroupWagerContract, Prediction};
use super::slap::SlapContract;
use super::Tokens;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub name: String,
    pub chat_tag: String,
    pub chat_id: String,
    pub league_id: String,
    pub balance: Tokens,
}

impl From<&Account> for AccountRecord {
    fn from(account: &Account) -> Self {
        Self {
            name: account.member_name().to_string(),
            chat_tag: account.mention_tag().to_string(),
            chat_id: account.chat_id().to_string(),
            league_id: account.league_id().to_string(),
            balance: account.balance(),
        }
    }
}

impl TryFrom<AccountRecord> for Account {
    type Error = VaultError;

    fn try_from(record: AccountRecord) -> Result<Self, Self::Error> {
        Account::new(
            record.name,
            record.chat_tag,
            record.chat_id,
            record.league_id,
            record.balance,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlapRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ContractId>,
    pub challenger: AccountRecord,
    pub challengee: AccountRecord,
    #[serde(with = "iso_datetime")]
    pub expiration: DateTime<Utc>,
    pub week: u32,
    #[serde(with = "title_bool")]
    pub executed: bool,
    /// Executed by refund rather than payout. Absent in older records.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub refunded: bool,
    pub amount: Tokens,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub gambler: AccountRecord,
    pub prediction_team: String,
    pub prediction_points: i64,
    #[serde(default)]
    pub stake: Tokens,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupWagerRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ContractId>,
    pub predictions: Vec<PredictionRecord>,
    pub team_1_id: String,
    pub team_2_id: String,
    #[serde(with = "iso_datetime")]
    pub expiration: DateTime<Utc>,
    pub week: u32,
    #[serde(with = "title_bool")]
    pub executed: bool,
    /// Executed by refund rather than payout. Absent in older records.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub refunded: bool,
    pub amount: Tokens,
    #[serde(default)]
    pub bonus: Tokens,
}

/// A stored contract, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContractRecord {
    SlapContract(SlapRecord),
    GroupWagerContract(GroupWagerRecord),
}

impl ContractRecord {
    pub fn kind(&self) -> ContractKind {
        match self {
            ContractRecord::SlapContract(_) => ContractKind::SlapContract,
            ContractRecord::GroupWagerContract(_) => ContractKind::GroupWagerContract,
        }
    }

    /// Decode one stored record; an unknown `type` is an `InvalidKind`.
    pub fn from_value(value: serde_json::Value) -> VaultResult<Self> {
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or_else(|| VaultError::validation("contract record has no type field"))?
            .parse::<ContractKind>()?;
        let record = match kind {
            ContractKind::SlapContract => {
                ContractRecord::SlapContract(serde_json::from_value(value).map_err(decode_error)?)
            }
            ContractKind::GroupWagerContract => ContractRecord::GroupWagerContract(
                serde_json::from_value(value).map_err(decode_error)?,
            ),
        };
        Ok(record)
    }

    /// Rebuild the contract, resolving every embedded account through `resolve`.
    pub fn into_contract<F>(self, resolve: F) -> VaultResult<Contract>
    where
        F: Fn(&AccountRecord) -> VaultResult<AccountHandle>,
    {
        match self {
            ContractRecord::SlapContract(rec) => {
                let core = ContractCore::restore(
                    rec.id,
                    rec.amount,
                    rec.expiration,
                    rec.week,
                    rec.executed,
                    rec.refunded,
                )?;
                let challenger = resolve(&rec.challenger)?;
                let challengee = resolve(&rec.challengee)?;
                Ok(Contract::Slap(SlapContract::restore(
                    core, challenger, challengee,
                )))
            }
            ContractRecord::GroupWagerContract(rec) => {
                let core = ContractCore::restore(
                    rec.id,
                    rec.amount,
                    rec.expiration,
                    rec.week,
                    rec.executed,
                    rec.refunded,
                )?;
                let predictions = rec
                    .predictions
                    .iter()
                    .map(|p| {
                        Ok(Prediction::restore(
                            resolve(&p.gambler)?,
                            p.prediction_team.clone(),
                            p.prediction_points,
                            p.stake,
                        ))
                    })
                    .collect::<VaultResult<Vec<_>>>()?;
                Ok(Contract::GroupWager(GroupWagerContract::restore(
                    core,
                    rec.team_1_id,
                    rec.team_2_id,
                    rec.bonus,
                    predictions,
                )?))
            }
        }
    }
}

impl From<&Contract> for ContractRecord {
    fn from(contract: &Contract) -> Self {
        match contract {
            Contract::Slap(slap) => ContractRecord::SlapContract(SlapRecord {
                id: Some(slap.id()),
                challenger: AccountRecord::from(&*slap.challenger().lock()),
                challengee: AccountRecord::from(&*slap.challengee().lock()),
                expiration: slap.core().expiration(),
                week: slap.core().week(),
                executed: slap.core().executed(),
                refunded: slap.core().refunded(),
                amount: slap.core().stake_amount(),
            }),
            Contract::GroupWager(wager) => ContractRecord::GroupWagerContract(GroupWagerRecord {
                id: Some(wager.id()),
                predictions: wager
                    .predictions()
                    .iter()
                    .map(|p| PredictionRecord {
                        gambler: AccountRecord::from(&*p.bettor().lock()),
                        prediction_team: p.predicted_side().to_string(),
                        prediction_points: p.predicted_total(),
                        stake: p.stake(),
                    })
                    .collect(),
                team_1_id: wager.side_a_id().to_string(),
                team_2_id: wager.side_b_id().to_string(),
                expiration: wager.core().expiration(),
                week: wager.core().week(),
                executed: wager.core().executed(),
                refunded: wager.core().refunded(),
                amount: wager.pot_amount(),
                bonus: wager.bonus(),
            }),
        }
    }
}

fn decode_error(err: serde_json::Error) -> VaultError {
    VaultError::validation(format!("malformed contract record: {err}"))
}

/// "True" / "False" strings; plain JSON booleans are accepted on read.
pub(crate) mod title_bool {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Bool(bool),
        Text(String),
    }

    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(if *value { "True" } else { "False" })
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Bool(b) => Ok(b),
            Repr::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(serde::de::Error::custom(format!(
                    "expected \"True\" or \"False\", got \"{other}\""
                ))),
            },
        }
    }
}

/// RFC 3339 on write. Naive ISO timestamps and bare dates are read as UTC.
pub(crate) mod iso_datetime {
    use super::*;

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("bad timestamp '{raw}'")))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        for fmt in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Some(naive.and_utc());
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}
