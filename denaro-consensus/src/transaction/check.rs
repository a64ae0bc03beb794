//! Transaction checks.
//!
//! Structural checks need no context; conservation and signature checks work
//! on the already-resolved referenced outputs, so the same functions serve
//! block validation and mempool admission.

use std::collections::HashSet;

use denaro_chain::amount::{Amount, MAX_MONEY};
use denaro_chain::parameters::ConsensusVersion;
use denaro_chain::transaction::{Output, Transaction, MAX_INPUTS, MAX_OUTPUTS, MAX_MESSAGE_BYTES};

use crate::error::TransactionError;

/// Structural validity: bounded counts, at least one output, positive
/// in-range amounts, no duplicate input references.
pub fn structure(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.len() > MAX_INPUTS {
        return Err(TransactionError::InvalidStructure("too many inputs"));
    }
    if tx.outputs.is_empty() {
        return Err(TransactionError::InvalidStructure("no outputs"));
    }
    if tx.outputs.len() > MAX_OUTPUTS {
        return Err(TransactionError::InvalidStructure("too many outputs"));
    }
    if let Some(message) = &tx.message {
        if message.len() > MAX_MESSAGE_BYTES {
            return Err(TransactionError::InvalidStructure("message too long"));
        }
    }

    for output in &tx.outputs {
        if output.amount.is_zero() || output.amount.units() > MAX_MONEY {
            return Err(TransactionError::AmountOutOfRange);
        }
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.outpoint) {
            return Err(TransactionError::InvalidStructure(
                "duplicate input reference",
            ));
        }
    }

    Ok(())
}

/// The extra shape rules for a coinbase: no inputs, a single output, no fee.
pub fn coinbase_structure(tx: &Transaction) -> Result<(), TransactionError> {
    if !tx.inputs.is_empty() || tx.outputs.len() != 1 || !tx.fees.is_zero() {
        return Err(TransactionError::InvalidStructure(
            "coinbase shape violation",
        ));
    }
    Ok(())
}

/// Conservation: the inputs fund the outputs plus exactly the declared fee.
///
/// `resolved` holds the referenced outputs, in input order.
pub fn conservation(tx: &Transaction, resolved: &[Output]) -> Result<(), TransactionError> {
    let inputs = Amount::sum(resolved.iter().map(|output| output.amount))
        .map_err(|_| TransactionError::AmountOutOfRange)?;
    let outputs = Amount::sum(tx.outputs.iter().map(|output| output.amount))
        .map_err(|_| TransactionError::AmountOutOfRange)?;

    let funded = outputs
        .checked_add(tx.fees)
        .map_err(|_| TransactionError::AmountOutOfRange)?;
    if inputs != funded {
        return Err(TransactionError::InsufficientFunds {
            inputs,
            outputs,
            fees: tx.fees,
        });
    }
    Ok(())
}

/// Every input signature must verify, over the transaction's signing digest,
/// against the key named by the referenced output's address.
pub fn signatures(
    tx: &Transaction,
    resolved: &[Output],
    version: ConsensusVersion,
) -> Result<(), TransactionError> {
    let digest = tx.signing_digest();
    for (input, output) in tx.inputs.iter().zip(resolved) {
        let key = output
            .address
            .to_public_key()
            .map_err(|_| TransactionError::BadSignature(input.outpoint))?;
        key.verify_digest(&digest, &input.signature, version.strict_low_s())
            .map_err(|_| TransactionError::BadSignature(input.outpoint))?;
    }
    Ok(())
}

/// The coinbase output must equal the scheduled reward plus the block fees.
pub fn coinbase_value(
    coinbase: &Transaction,
    reward: Amount,
    fees: Amount,
) -> Result<(), TransactionError> {
    let expected = reward
        .checked_add(fees)
        .map_err(|_| TransactionError::AmountOutOfRange)?;
    let actual = coinbase
        .outputs
        .first()
        .map(|output| output.amount)
        .unwrap_or(Amount::ZERO);
    if actual != expected {
        return Err(TransactionError::CoinbaseValueMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use denaro_chain::address::Address;
    use denaro_chain::keys::SecretKey;
    use denaro_chain::transaction::{Hash, Input, OutPoint, CURRENT_VERSION};

    fn output(amount: i64) -> Output {
        Output {
            address: Address::from(&SecretKey::generate().public_key()),
            amount: Amount::from_units(amount).unwrap(),
        }
    }

    fn outpoint(byte: u8) -> OutPoint {
        OutPoint {
            hash: Hash([byte; 32]),
            index: 0,
        }
    }

    #[test]
    fn duplicate_inputs_rejected() {
        let tx = Transaction::new(
            CURRENT_VERSION,
            vec![Input::unsigned(outpoint(1)), Input::unsigned(outpoint(1))],
            vec![output(10)],
            None,
            Amount::ZERO,
        );
        assert!(matches!(
            structure(&tx),
            Err(TransactionError::InvalidStructure(_))
        ));
    }

    #[test]
    fn zero_amount_output_rejected() {
        let mut tx = Transaction::coinbase(output(1).address, Amount::from_units(1).unwrap());
        tx.outputs[0].amount = Amount::ZERO;
        assert_eq!(structure(&tx), Err(TransactionError::AmountOutOfRange));
    }

    #[test]
    fn conservation_requires_exact_fee() {
        let resolved = vec![output(100)];
        let tx = Transaction::new(
            CURRENT_VERSION,
            vec![Input::unsigned(outpoint(1))],
            vec![output(90)],
            None,
            Amount::from_units(10).unwrap(),
        );
        assert!(conservation(&tx, &resolved).is_ok());

        let undeclared = Transaction::new(
            CURRENT_VERSION,
            vec![Input::unsigned(outpoint(1))],
            vec![output(90)],
            None,
            Amount::from_units(5).unwrap(),
        );
        assert!(matches!(
            conservation(&undeclared, &resolved),
            Err(TransactionError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn signature_must_match_the_referenced_address() {
        let owner = SecretKey::generate();
        let resolved = vec![Output {
            address: Address::from(&owner.public_key()),
            amount: Amount::from_units(100).unwrap(),
        }];

        let mut tx = Transaction::new(
            CURRENT_VERSION,
            vec![Input::unsigned(outpoint(1))],
            vec![output(100)],
            None,
            Amount::ZERO,
        );

        tx.sign(&[&owner]);
        assert!(signatures(&tx, &resolved, ConsensusVersion::V1).is_ok());

        let stranger = SecretKey::generate();
        tx.sign(&[&stranger]);
        assert!(matches!(
            signatures(&tx, &resolved, ConsensusVersion::V1),
            Err(TransactionError::BadSignature(_))
        ));
    }

    #[test]
    fn coinbase_value_includes_fees() {
        let reward = Amount::from_coins(64).unwrap();
        let fees = Amount::from_units(123).unwrap();
        let coinbase = Transaction::coinbase(
            output(1).address,
            reward.checked_add(fees).unwrap(),
        );
        assert!(coinbase_value(&coinbase, reward, fees).is_ok());
        assert!(coinbase_value(&coinbase, reward, Amount::ZERO).is_err());
    }
}
