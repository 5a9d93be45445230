use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::{Account, Amount, TransferCommand, UserId};

/// Errors that can occur when reading or writing csv files
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("{}: failed to open: {source}", path.display())]
    Open { path: PathBuf, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: malformed user id '{value}'")]
    MalformedUserId { line: usize, value: String },

    #[error("line {line}: invalid amount {value}")]
    InvalidAmount { line: usize, value: f64 },

    #[error("failed to write row: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush output: {0}")]
    Flush(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    owner: String,
    balance: f64,
}

#[derive(Debug, Deserialize)]
struct TransferRow {
    from: String,
    to: String,
    amount: f64,
}

#[derive(Debug, Serialize)]
struct BalanceRow {
    owner: UserId,
    balance: String,
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>, CsvError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_user(line: usize, value: String) -> Result<UserId, CsvError> {
    value
        .parse()
        .map_err(|_| CsvError::MalformedUserId { line, value })
}

/// Read initial accounts (`owner,balance`) from a csv file
pub fn read_accounts(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<Account, CsvError>>, CsvError> {
    let reader = open(path.as_ref())?;

    Ok(reader
        .into_deserialize::<AccountRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let owner = parse_user(line, row.owner)?;
            let balance = Amount::try_from_float(row.balance).ok_or(CsvError::InvalidAmount {
                line,
                value: row.balance,
            })?;
            Ok(Account { owner, balance })
        }))
}

/// Read transfers (`from,to,amount`) from a csv file.
///
/// Only the caller (`from`) is checked here; the payee and the amount are
/// handed over raw and validated by the engine.
pub fn read_transfers(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<TransferCommand, CsvError>>, CsvError> {
    let reader = open(path.as_ref())?;

    Ok(reader
        .into_deserialize::<TransferRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2;
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let from = parse_user(line, row.from)?;
            Ok(TransferCommand::new(from, row.to, row.amount))
        }))
}

/// Write account balances in csv format
pub fn write_balances(
    writer: impl io::Write,
    accounts: impl IntoIterator<Item = Account>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);

    for account in accounts {
        writer.serialize(BalanceRow {
            owner: account.owner,
            balance: account.balance.to_string(),
        })?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ALICE: &str = "6f1c2a4e-8d7b-4b1e-9a55-0c3f2d1e7a10";
    const BOB: &str = "a3b9e0d2-41c7-4f5e-8b1a-2d6c9e7f0b34";

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn read_account() {
        let file = write_csv(&format!("owner,balance\n{ALICE},100.5\n"));
        let results: Vec<_> = read_accounts(file.path()).unwrap().collect();
        assert_eq!(results.len(), 1);

        let account = results.into_iter().next().unwrap().unwrap();
        assert_eq!(account.owner.to_string(), ALICE);
        assert_eq!(account.balance, Amount::from_float(100.5));
    }

    #[test]
    fn read_transfer_with_whitespace() {
        let file = write_csv(&format!("from, to, amount\n{ALICE}, {BOB}, 30\n"));
        let results: Vec<_> = read_transfers(file.path()).unwrap().collect();
        assert_eq!(results.len(), 1);

        let command = results.into_iter().next().unwrap().unwrap();
        assert_eq!(command.from.to_string(), ALICE);
        assert_eq!(command.to, BOB);
        assert_eq!(command.amount, 30.0);
    }

    #[test]
    fn payee_is_passed_through_unvalidated() {
        let file = write_csv(&format!("from,to,amount\n{ALICE},nobody,-5\n"));
        let command = read_transfers(file.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(command.to, "nobody");
        assert_eq!(command.amount, -5.0);
    }

    #[test]
    fn read_returns_error_for_malformed_caller() {
        let file = write_csv(&format!("from,to,amount\nnobody,{BOB},1\n"));
        let results: Vec<_> = read_transfers(file.path()).unwrap().collect();
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::MalformedUserId { line: 2, .. }));
    }

    #[test]
    fn read_returns_error_for_missing_amount() {
        let file = write_csv(&format!("from,to,amount\n{ALICE},{BOB},\n"));
        let results: Vec<_> = read_transfers(file.path()).unwrap().collect();
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::Parse { line: 2, .. }));
    }

    #[test]
    fn read_returns_error_for_non_finite_balance() {
        let file = write_csv(&format!("owner,balance\n{ALICE},inf\n"));
        let results: Vec<_> = read_accounts(file.path()).unwrap().collect();
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::InvalidAmount { line: 2, .. }));
    }

    #[test]
    fn open_missing_file_fails() {
        let result = read_accounts("/definitely/not/here.csv");
        assert!(matches!(result, Err(CsvError::Open { .. })));
    }

    #[test]
    fn write_balances_in_order_given() {
        let accounts = vec![
            Account {
                owner: ALICE.parse().unwrap(),
                balance: Amount::from_float(70.0),
            },
            Account {
                owner: BOB.parse().unwrap(),
                balance: Amount::from_float(80.25),
            },
        ];
        let mut out = Vec::new();
        write_balances(&mut out, accounts).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "owner,balance");
        assert_eq!(lines[1], format!("{ALICE},70.0000"));
        assert_eq!(lines[2], format!("{BOB},80.2500"));
    }
}
