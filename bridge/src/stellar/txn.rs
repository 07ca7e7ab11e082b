use anyhow::{anyhow, bail, Context, Result};
use base64::prelude::{Engine, BASE64_STANDARD};
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    AccountId, AlphaNum4, Asset, AssetCode4, DecoratedSignature, Hash, Limits, Memo, MuxedAccount,
    Operation, OperationBody, PaymentOp, Preconditions, PublicKey, SequenceNumber, Signature,
    SignatureHint, TimeBounds, TimePoint, Transaction, TransactionEnvelope, TransactionExt,
    TransactionSignaturePayload, TransactionSignaturePayloadTaggedTransaction,
    TransactionV1Envelope, Uint256, WriteXdr,
};
use tfchain_client::StellarSignature;

/// Stellar minimum base fee is 100 stroops; a generous multiplier keeps the
/// bridge transactions attractive during congestion.
pub const BASE_FEE: u32 = 100 * 1000;

fn ed25519_key(address: &str) -> Result<Uint256> {
    let key = stellar_strkey::ed25519::PublicKey::from_string(address)
        .map_err(|e| anyhow!("invalid stellar address {address}: {e}"))?;
    Ok(Uint256(key.0))
}

pub fn muxed_account(address: &str) -> Result<MuxedAccount> {
    Ok(MuxedAccount::Ed25519(ed25519_key(address)?))
}

pub fn credit_asset(code: &str, issuer: &str) -> Result<Asset> {
    if code.is_empty() || code.len() > 4 {
        bail!("asset code {code} does not fit alphanum4");
    }
    let mut code4 = [0u8; 4];
    code4[..code.len()].copy_from_slice(code.as_bytes());
    Ok(Asset::CreditAlphanum4(AlphaNum4 {
        asset_code: AssetCode4(code4),
        issuer: AccountId(PublicKey::PublicKeyTypeEd25519(ed25519_key(issuer)?)),
    }))
}

/// A `MemoReturn` carrying the hash of the deposit being paid back.
pub fn return_memo(tx_hash_hex: &str) -> Result<Memo> {
    let raw = hex::decode(tx_hash_hex)
        .with_context(|| format!("memo hash {tx_hash_hex} is not hex"))?;
    let mut memo = [0u8; 32];
    let len = raw.len().min(32);
    memo[..len].copy_from_slice(&raw[..len]);
    Ok(Memo::Return(Hash(memo)))
}

/// Build the single-payment transaction every bridge operation boils down to.
/// Timebounds are infinite: the transaction stays valid for however long
/// collecting the validator signatures takes.
pub fn build_payment(
    source_account: &str,
    destination: &str,
    asset: Asset,
    amount: i64,
    sequence: i64,
    memo: Memo,
) -> Result<Transaction> {
    let payment = PaymentOp {
        destination: muxed_account(destination)?,
        asset,
        amount,
    };
    let operation = Operation {
        source_account: Some(muxed_account(source_account)?),
        body: OperationBody::Payment(payment),
    };
    Ok(Transaction {
        source_account: muxed_account(source_account)?,
        fee: BASE_FEE,
        seq_num: SequenceNumber(sequence),
        cond: Preconditions::Time(TimeBounds {
            min_time: TimePoint(0),
            max_time: TimePoint(0),
        }),
        memo,
        operations: vec![operation]
            .try_into()
            .map_err(|_| anyhow!("operation count out of range"))?,
        ext: TransactionExt::V0,
    })
}

/// Hash a transaction the way the network expects it to be signed: sha256 of
/// the signature payload tagged with the network id.
pub fn signature_payload_hash(tx: &Transaction, network_passphrase: &str) -> Result<[u8; 32]> {
    let network_id: [u8; 32] = Sha256::digest(network_passphrase.as_bytes()).into();
    let payload = TransactionSignaturePayload {
        network_id: Hash(network_id),
        tagged_transaction: TransactionSignaturePayloadTaggedTransaction::Tx(tx.clone()),
    };
    let bytes = payload
        .to_xdr(Limits::none())
        .context("failed to encode signature payload")?;
    Ok(Sha256::digest(&bytes).into())
}

/// Produce this validator's decorated signature over `tx`.
pub fn sign(tx: &Transaction, network_passphrase: &str, key: &SigningKey) -> Result<DecoratedSignature> {
    let digest = signature_payload_hash(tx, network_passphrase)?;
    let signature = key.sign(&digest);
    Ok(DecoratedSignature {
        hint: signature_hint(&key.verifying_key().to_bytes()),
        signature: Signature(
            signature
                .to_bytes()
                .to_vec()
                .try_into()
                .map_err(|_| anyhow!("signature length out of range"))?,
        ),
    })
}

pub fn signature_base64(signature: &DecoratedSignature) -> String {
    BASE64_STANDARD.encode(signature.signature.0.as_slice())
}

/// Rebuild a decorated signature from the `(address, base64)` pair another
/// validator stored on chain.
pub fn decorated_signature_from_base64(address: &str, signature_b64: &str) -> Result<DecoratedSignature> {
    let raw = BASE64_STANDARD
        .decode(signature_b64)
        .with_context(|| format!("signature of {address} is not base64"))?;
    let key = ed25519_key(address)?;
    Ok(DecoratedSignature {
        hint: signature_hint(&key.0),
        signature: Signature(
            raw.try_into()
                .map_err(|_| anyhow!("signature of {address} has an invalid length"))?,
        ),
    })
}

/// A signature hint is the last four bytes of the signer's public key.
fn signature_hint(public: &[u8; 32]) -> SignatureHint {
    let mut hint = [0u8; 4];
    hint.copy_from_slice(&public[28..32]);
    SignatureHint(hint)
}

/// Attach the collected validator signatures to a rebuilt transaction.
/// Exactly `required` signatures are taken, in the order they were stored;
/// fewer than `required` is a hard error, nothing is submitted.
pub fn attach_signatures(
    tx: Transaction,
    signatures: &[StellarSignature],
    required: usize,
) -> Result<TransactionEnvelope> {
    if signatures.len() < required {
        bail!("not enough signatures, aborting");
    }
    let mut decorated = Vec::with_capacity(required);
    for sig in &signatures[..required] {
        let address = std::str::from_utf8(&sig.stellar_address)
            .context("stored stellar address is not utf-8")?;
        let signature = std::str::from_utf8(&sig.signature)
            .context("stored signature is not utf-8")?;
        decorated.push(decorated_signature_from_base64(address, signature)?);
    }
    Ok(TransactionEnvelope::Tx(TransactionV1Envelope {
        tx,
        signatures: decorated
            .try_into()
            .map_err(|_| anyhow!("signature count out of range"))?,
    }))
}

pub fn envelope_base64(envelope: &TransactionEnvelope) -> Result<String> {
    envelope
        .to_xdr_base64(Limits::none())
        .context("failed to encode transaction envelope")
}
