#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use alloy_primitives::{address, b256, Address, B256, U256};
    use alloy_sol_types::SolCall;

    use crate::address::{create2_address, derive_address, wallet_salt};
    use crate::config::{ConfigError, MAX_SUBMIT_TIMEOUT_SECS};
    use crate::digest::{build_digest, create_wallet_type_hash, domain_separator, policy_digest, struct_hash};
    use crate::encoder::{decode_policy, encode_policy, policy_words, GUARDIANS_OFFSET, WORD};
    use crate::errors::{MismatchOrigin, SubmissionError};
    use crate::factory::{
        compute_wallet_address_calldata, createWalletCall, created_wallet, decode_compute_wallet_address,
        wallet_created_log,
    };
    use crate::mock::MockChain;
    use crate::raw_tx::{self, LegacyTransaction};
    use crate::replay::{fixtures_from_json, replay_fixture, replay_fixtures};
    use crate::signer::{recover_signer, sign, verify_authorization, AuthorizationSigner, LocalKeySigner};
    use crate::types::{EncodedPolicy, FactoryDomain};
    use crate::{
        AuthorizationSignature, ChainError, EncodingError, MalformedTxError, ProvisionError, ProvisioningConfig,
        ProvisioningState, Provisioner, RawTxFixture, SigningError, WalletPolicy,
    };

    const FACTORY: Address = address!("44b74caf7cb28cc243eaa9d1d1b3ecb2ddc2c9f1");
    const CHAIN_ID: u64 = 42161;
    const OWNER: Address = address!("aaa417ed79343d531d3dd5a037b2e3714a648e6e");
    const OWNER_KEY: &str = "0x0000000000000000000000000000000000000000000000000000000000006351";
    const OTHER_KEY: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";
    /// keccak256(0x00)
    const INIT_CODE_HASH: B256 = b256!("bc36789e7a1e281436464229828f817d6612f7b477d66591ff96a9e064bcc98a");
    const PREDICTED: Address = address!("c625d1cc473611030b69ccdf4ed3e20e1fba10e5");

    const FIXTURES_JSON: &str = include_str!("../tests/fixtures/raw_txs.json");

    fn guardian_a() -> Address {
        Address::repeat_byte(0x12)
    }

    fn guardian_b() -> Address {
        Address::repeat_byte(0x34)
    }

    fn policy() -> WalletPolicy {
        WalletPolicy::new(OWNER, U256::from(1u64)).with_guardians([guardian_a()])
    }

    fn config() -> ProvisioningConfig {
        ProvisioningConfig::new(FACTORY, CHAIN_ID, INIT_CODE_HASH)
    }

    fn domain() -> FactoryDomain {
        FactoryDomain::new(FACTORY, CHAIN_ID)
    }

    fn owner_signer() -> LocalKeySigner {
        LocalKeySigner::from_hex(OWNER_KEY).unwrap()
    }

    fn provisioner(chain: MockChain) -> (Provisioner<MockChain>, Arc<MockChain>) {
        let chain = Arc::new(chain);
        (Provisioner::new(Arc::new(config()), Arc::clone(&chain)), chain)
    }

    fn word(encoded: &EncodedPolicy, index: usize) -> &[u8] {
        &encoded.as_bytes()[index * WORD..(index + 1) * WORD]
    }

    // ---- encoder ----

    #[test]
    fn test_encode_policy_layout() {
        let policy = policy()
            .with_quota(U256::from(1_000u64))
            .with_inheritor(Address::repeat_byte(0x77))
            .with_fee(Address::repeat_byte(0x88), Address::repeat_byte(0x99), U256::from(5u64));
        let encoded = encode_policy(&policy).unwrap();

        assert_eq!(encoded.len(), WORD * 10);
        assert_eq!(&word(&encoded, 0)[12..], OWNER.as_slice());
        assert_eq!(U256::from_be_slice(word(&encoded, 1)), U256::from(GUARDIANS_OFFSET));
        assert_eq!(U256::from_be_slice(word(&encoded, 2)), U256::from(1_000u64));
        assert_eq!(&word(&encoded, 3)[12..], Address::repeat_byte(0x77).as_slice());
        assert_eq!(&word(&encoded, 4)[12..], Address::repeat_byte(0x88).as_slice());
        assert_eq!(&word(&encoded, 5)[12..], Address::repeat_byte(0x99).as_slice());
        assert_eq!(U256::from_be_slice(word(&encoded, 6)), U256::from(5u64));
        assert_eq!(U256::from_be_slice(word(&encoded, 7)), U256::from(1u64));
        assert_eq!(U256::from_be_slice(word(&encoded, 8)), U256::from(1u64));
        assert_eq!(&word(&encoded, 9)[12..], guardian_a().as_slice());
        assert!(word(&encoded, 9)[..12].iter().all(|b| *b == 0));

        assert_eq!(decode_policy(&encoded).unwrap(), policy);
    }

    #[test]
    fn test_encode_policy_is_deterministic() {
        let a = encode_policy(&policy()).unwrap();
        let b = encode_policy(&policy()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_encode_policy_without_guardians() {
        let policy = WalletPolicy::new(OWNER, U256::ZERO);
        let encoded = encode_policy(&policy).unwrap();
        assert_eq!(encoded.len(), WORD * 9);
        assert_eq!(U256::from_be_slice(word(&encoded, 8)), U256::ZERO);
        assert_eq!(policy_words(&encoded).unwrap().guardian_count(), 0);
        assert_eq!(decode_policy(&encoded).unwrap(), policy);
    }

    #[test]
    fn test_encode_policy_rejects_invalid_policies() {
        let zero_owner = WalletPolicy::new(Address::ZERO, U256::ZERO);
        assert_eq!(encode_policy(&zero_owner).unwrap_err(), EncodingError::ZeroOwner);

        let duplicate = policy().with_guardians([guardian_a(), guardian_b(), guardian_a()]);
        assert_eq!(
            encode_policy(&duplicate).unwrap_err(),
            EncodingError::DuplicateGuardian(guardian_a())
        );

        let zero_guardian = policy().with_guardians([Address::ZERO]);
        assert_eq!(encode_policy(&zero_guardian).unwrap_err(), EncodingError::ZeroGuardian);
    }

    #[test]
    fn test_policy_words_rejects_foreign_layouts() {
        let encoded = encode_policy(&policy()).unwrap();

        let mut dirty = encoded.as_bytes().to_vec();
        dirty[0] = 1;
        assert!(matches!(
            policy_words(&EncodedPolicy::from_vec(dirty)),
            Err(EncodingError::MalformedEncoding(_))
        ));

        let mut extra = encoded.as_bytes().to_vec();
        extra.extend_from_slice(&[0u8; WORD]);
        assert!(matches!(
            policy_words(&EncodedPolicy::from_vec(extra)),
            Err(EncodingError::MalformedEncoding(_))
        ));

        let truncated = encoded.as_bytes()[..WORD * 9 + 5].to_vec();
        assert!(policy_words(&EncodedPolicy::from_vec(truncated)).is_err());

        let mut bad_offset = encoded.as_bytes().to_vec();
        bad_offset[WORD * 2 - 1] = 0x20;
        assert!(policy_words(&EncodedPolicy::from_vec(bad_offset)).is_err());
    }

    // ---- digest ----

    #[test]
    fn test_digest_matches_factory_vectors() {
        assert_eq!(
            create_wallet_type_hash(),
            b256!("def9974af9b202f82c9de92ceb8e6e09a1fb36c484b4f8d55af6e1000a2d3e57")
        );
        assert_eq!(
            domain_separator(&domain()),
            b256!("3d26468885fbf2335cb790833ab2261d1686ff50d86d9c324ad02573042e8bc0")
        );
        let encoded = encode_policy(&policy()).unwrap();
        assert_eq!(
            build_digest(&domain(), &encoded).unwrap(),
            b256!("87e9b6f1a5578ee1c34345b6a66874d635417d937da22af7663e9726277ddd93")
        );
        assert_eq!(config().domain(), domain());
    }

    #[test]
    fn test_digest_depends_on_guardian_order() {
        let ab = policy_digest(&domain(), &policy().with_guardians([guardian_a(), guardian_b()])).unwrap();
        let ba = policy_digest(&domain(), &policy().with_guardians([guardian_b(), guardian_a()])).unwrap();
        assert_eq!(ab, b256!("abcdfcf09dbc9a47337777737a67471381c04681f5bb4f531d292844b4a41311"));
        assert_eq!(ba, b256!("6eb67a90844ab3ea32f9b4ff826b55d51b0d74efa136c5481506b0deb010899f"));
    }

    #[test]
    fn test_digest_is_scoped_to_factory_and_chain() {
        let other_factory = FactoryDomain::new(Address::repeat_byte(0x55), CHAIN_ID);
        let other_chain = FactoryDomain::new(FACTORY, 1);
        assert_eq!(
            policy_digest(&other_factory, &policy()).unwrap(),
            b256!("baa620c9040155bdf530f6c289c3152b98ec80ec9d4a1712f28b0040ec5c2a1b")
        );
        assert_eq!(
            policy_digest(&other_chain, &policy()).unwrap(),
            b256!("8220de0dac4db47237eea9c7b01ae7e6b5621592b74f2396c1017de4351c4d7d")
        );
    }

    #[test]
    fn test_struct_hash_rejects_malformed_encoding() {
        let err = struct_hash(&EncodedPolicy::from_vec(vec![0u8; 31])).unwrap_err();
        assert!(matches!(err, EncodingError::MalformedEncoding(_)));
    }

    // ---- signer ----

    #[test]
    fn test_local_key_signer_address() {
        assert_eq!(owner_signer().address(), OWNER);
        assert_eq!(
            LocalKeySigner::from_hex(OTHER_KEY).unwrap().address(),
            address!("7e5f4552091a69125d5dfcb7b8c2659029395bdf")
        );
    }

    #[test]
    fn test_local_key_signer_rejects_bad_keys() {
        assert_eq!(LocalKeySigner::from_bytes(&[1u8; 31]).unwrap_err(), SigningError::InvalidKey);
        assert_eq!(LocalKeySigner::from_bytes(&[0u8; 32]).unwrap_err(), SigningError::InvalidKey);
        assert_eq!(LocalKeySigner::from_hex("0xnothex").unwrap_err(), SigningError::InvalidKey);
    }

    #[test]
    fn test_local_key_signer_debug_hides_secret() {
        let rendered = format!("{:?}", owner_signer());
        assert!(rendered.contains("LocalKeySigner"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_sign_and_verify_authorization() {
        let digest = policy_digest(&domain(), &policy()).unwrap();
        let signature = owner_signer().sign_digest(&digest).unwrap();

        assert_eq!(signature.len(), 65);
        let v = signature.as_bytes()[64];
        assert!(v == 27 || v == 28);

        // low-s: s <= n/2
        let half_order: [u8; 32] = b256!("7fffffffffffffffffffffffffffffff5d576e7357a4501ddfe92f46681b20a0").0;
        assert!(signature.as_bytes()[32..64] <= half_order[..]);

        assert_eq!(verify_authorization(&domain(), &policy(), &signature).unwrap(), OWNER);
        assert_eq!(recover_signer(&digest, signature.as_bytes()).unwrap(), OWNER);
    }

    #[test]
    fn test_recover_accepts_zero_based_recovery_byte() {
        let digest = policy_digest(&domain(), &policy()).unwrap();
        let mut bytes = owner_signer().sign_digest(&digest).unwrap().as_bytes().to_vec();
        bytes[64] -= 27;
        assert_eq!(recover_signer(&digest, &bytes).unwrap(), OWNER);

        bytes[64] = 5;
        assert_eq!(recover_signer(&digest, &bytes).unwrap_err(), SigningError::InvalidRecoveryId(5));
        assert_eq!(recover_signer(&digest, &bytes[..64]).unwrap_err(), SigningError::InvalidLength(64));
    }

    #[test]
    fn test_verify_rejects_tampered_policy_and_foreign_domain() {
        let digest = policy_digest(&domain(), &policy()).unwrap();
        let signature = owner_signer().sign_digest(&digest).unwrap();

        let tampered = policy().with_quota(U256::from(1u64));
        assert!(matches!(
            verify_authorization(&domain(), &tampered, &signature),
            Err(SigningError::SignerMismatch { expected, .. }) if expected == OWNER
        ));

        let foreign = FactoryDomain::new(Address::repeat_byte(0x55), CHAIN_ID);
        assert!(matches!(
            verify_authorization(&foreign, &policy(), &signature),
            Err(SigningError::SignerMismatch { .. })
        ));
    }

    #[test]
    fn test_verify_rejects_signature_from_another_key() {
        let digest = policy_digest(&domain(), &policy()).unwrap();
        let key = k256::ecdsa::SigningKey::from_slice(&hex::decode(&OTHER_KEY[2..]).unwrap()).unwrap();
        let signature = sign(&digest, &key).unwrap();
        assert_eq!(
            verify_authorization(&domain(), &policy(), &signature).unwrap_err(),
            SigningError::SignerMismatch {
                expected: OWNER,
                recovered: address!("7e5f4552091a69125d5dfcb7b8c2659029395bdf"),
            }
        );
    }

    // ---- address ----

    #[test]
    fn test_create2_eip1014_vectors() {
        let keccak_00 = INIT_CODE_HASH;
        assert_eq!(
            create2_address(Address::ZERO, B256::ZERO, keccak_00),
            address!("4d1a2e2bb4f88f0250f26ffff098b0b30b26bf38")
        );
        assert_eq!(
            create2_address(address!("deadbeef00000000000000000000000000000000"), B256::ZERO, keccak_00),
            address!("b928f69bb1d91cd65274e3c79d8986362984fda3")
        );

        let deployer = address!("00000000000000000000000000000000deadbeef");
        let salt = b256!("00000000000000000000000000000000000000000000000000000000cafebabe");
        let init_code_hash = crate::digest::keccak256_bytes(&[0xde, 0xad, 0xbe, 0xef]);
        let expected = address!("60f3f640a8508fc6a86d45df051962668e1e8ac7");
        assert_eq!(create2_address(deployer, salt, init_code_hash), expected);
        assert_eq!(deployer.create2(salt.0, init_code_hash.0), expected);
    }

    #[test]
    fn test_predicted_wallet_address() {
        assert_eq!(
            wallet_salt(OWNER, U256::from(1u64)),
            b256!("8180e5699e9479d83ef2f8d9462c8d8b134975434c62bb17c43a0e3c4c25d1d8")
        );
        assert_eq!(derive_address(OWNER, U256::from(1u64), FACTORY, INIT_CODE_HASH), PREDICTED);
        assert_eq!(config().predict_wallet_address(OWNER, U256::from(1u64)), PREDICTED);
        assert_eq!(
            config().predict_wallet_address(OWNER, U256::from(2u64)),
            address!("10301c1307e250518aaa07b0df2638ae58374f7b")
        );
    }

    // ---- config ----

    #[test]
    fn test_config_from_json_applies_defaults() {
        let json = r#"{
            "factory": "0x44b74caf7cb28cc243eaa9d1d1b3ecb2ddc2c9f1",
            "chainId": 42161,
            "walletInitCodeHash": "0xbc36789e7a1e281436464229828f817d6612f7b477d66591ff96a9e064bcc98a"
        }"#;
        let parsed = ProvisioningConfig::from_json_str(json).unwrap();
        assert_eq!(parsed, config());
        assert_eq!(parsed.domain_name, "WalletFactory");
        assert_eq!(parsed.domain_version, "2.0.0");
        assert_eq!(parsed.submit_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_config_rejects_zero_values() {
        let mut bad = config();
        bad.factory = Address::ZERO;
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.chain_id = 0;
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.wallet_init_code_hash = B256::ZERO;
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.submit_timeout_secs = 0;
        assert!(matches!(bad.validate(), Err(ConfigError::SubmitTimeoutOutOfRange(0))));
    }

    #[test]
    fn test_config_rejects_unbounded_submit_timeout() {
        let json = r#"{
            "factory": "0x44b74caf7cb28cc243eaa9d1d1b3ecb2ddc2c9f1",
            "chainId": 42161,
            "walletInitCodeHash": "0xbc36789e7a1e281436464229828f817d6612f7b477d66591ff96a9e064bcc98a",
            "submitTimeoutSecs": 18446744073709551615
        }"#;
        assert!(matches!(
            ProvisioningConfig::from_json_str(json),
            Err(ConfigError::SubmitTimeoutOutOfRange(u64::MAX))
        ));

        let mut longest = config();
        longest.submit_timeout_secs = MAX_SUBMIT_TIMEOUT_SECS;
        assert!(longest.validate().is_ok());
    }

    // ---- factory ABI ----

    #[test]
    fn test_create_wallet_calldata_carries_policy_and_signature() {
        let signature = AuthorizationSignature::new(vec![7u8; 65]);
        let request = crate::WalletCreationRequest::new(policy(), signature.clone());
        let payload = crate::factory::submission_payload(&config(), &request);

        assert_eq!(payload.to, FACTORY);
        assert_eq!(payload.gas_limit, config().gas_limit);
        assert_eq!(&payload.calldata[..4], createWalletCall::SELECTOR.as_slice());

        let call = createWalletCall::abi_decode(&payload.calldata, true).unwrap();
        assert_eq!(call.config.owner, OWNER);
        assert_eq!(call.config.guardians, vec![guardian_a()]);
        assert_eq!(&call.config.signature[..], signature.as_bytes());
        assert_eq!(call.salt, U256::from(1u64));
    }

    #[test]
    fn test_compute_wallet_address_abi() {
        let calldata = compute_wallet_address_calldata(OWNER, U256::from(1u64));
        assert_eq!(calldata.len(), 4 + 64);

        let mut ret = [0u8; 32];
        ret[12..].copy_from_slice(PREDICTED.as_slice());
        assert_eq!(decode_compute_wallet_address(&ret).unwrap(), PREDICTED);
        assert!(matches!(
            decode_compute_wallet_address(&ret[..20]),
            Err(ChainError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_created_wallet_filters_by_factory_and_owner() {
        let foreign = wallet_created_log(Address::repeat_byte(0x55), Address::repeat_byte(0x01), OWNER);
        let other_owner = wallet_created_log(FACTORY, Address::repeat_byte(0x02), Address::repeat_byte(0x03));
        let ours = wallet_created_log(FACTORY, PREDICTED, OWNER);

        assert_eq!(created_wallet(FACTORY, OWNER, &[foreign.clone(), other_owner.clone()]), None);
        assert_eq!(created_wallet(FACTORY, OWNER, &[foreign, other_owner, ours]), Some(PREDICTED));
    }

    // ---- orchestrator ----

    #[tokio::test]
    async fn test_provision_confirms_wallet() {
        let (provisioner, chain) = provisioner(MockChain::new(config()));
        let mut attempt = provisioner.begin(policy());
        assert_eq!(attempt.state(), ProvisioningState::Unstarted);

        let wallet = provisioner
            .provision(&mut attempt, &owner_signer(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(wallet, PREDICTED);
        assert!(attempt.is_confirmed());
        assert_eq!(attempt.predicted_address(), Some(PREDICTED));
        assert_eq!(
            attempt.digest(),
            Some(b256!("87e9b6f1a5578ee1c34345b6a66874d635417d937da22af7663e9726277ddd93"))
        );
        assert_eq!(attempt.submissions(), 1);
        assert!(attempt.receipt().is_some_and(|r| r.success));

        let request = attempt.request().unwrap();
        assert_eq!(
            verify_authorization(&config().domain(), request.policy(), request.signature()).unwrap(),
            OWNER
        );
        assert_eq!(chain.submitted_payloads().len(), 1);
    }

    #[tokio::test]
    async fn test_step_by_step_transitions() {
        let (provisioner, _chain) = provisioner(MockChain::new(config()).without_oracle());
        let mut attempt = provisioner.begin(policy());

        assert_eq!(provisioner.predict_address(&mut attempt).await.unwrap(), PREDICTED);
        assert_eq!(attempt.state(), ProvisioningState::AddressPredicted);

        provisioner.build_request(&mut attempt, &owner_signer()).unwrap();
        assert_eq!(attempt.state(), ProvisioningState::Signed);
        assert!(attempt.encoded_policy().is_some());
        assert!(attempt.payload().is_some());

        provisioner.submit(&mut attempt, Duration::from_secs(5)).await.unwrap();
        assert_eq!(attempt.state(), ProvisioningState::Confirmed);
    }

    #[tokio::test]
    async fn test_out_of_order_steps_are_rejected() {
        let (provisioner, _chain) = provisioner(MockChain::new(config()));
        let mut attempt = provisioner.begin(policy());

        let err = provisioner.submit(&mut attempt, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::InvalidTransition { state: ProvisioningState::Unstarted, .. }
        ));
        assert!(provisioner.build_request(&mut attempt, &owner_signer()).is_err());
        assert_eq!(attempt.state(), ProvisioningState::Unstarted);

        provisioner
            .provision(&mut attempt, &owner_signer(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(provisioner.predict_address(&mut attempt).await.is_err());
        let err = provisioner.submit(&mut attempt, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::InvalidTransition { state: ProvisioningState::Confirmed, .. }
        ));
    }

    #[tokio::test]
    async fn test_oracle_mismatch_is_terminal() {
        let lie = Address::repeat_byte(0x99);
        let (provisioner, chain) = provisioner(MockChain::new(config()).oracle_reporting(lie));
        let mut attempt = provisioner.begin(policy());

        let err = provisioner
            .provision(&mut attempt, &owner_signer(), Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            ProvisionError::AddressMismatch(mismatch) => {
                assert_eq!(mismatch.predicted, PREDICTED);
                assert_eq!(mismatch.reported, lie);
                assert_eq!(mismatch.origin, MismatchOrigin::Oracle);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(attempt.state(), ProvisioningState::Failed);
        assert!(!attempt.can_resubmit());
        assert!(chain.submitted_payloads().is_empty());
    }

    #[tokio::test]
    async fn test_receipt_mismatch_is_terminal() {
        let lie = Address::repeat_byte(0x99);
        let (provisioner, _chain) = provisioner(MockChain::new(config()).creating_at(lie));
        let mut attempt = provisioner.begin(policy());

        let err = provisioner
            .provision(&mut attempt, &owner_signer(), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(err.is_address_mismatch());
        assert!(!err.is_retryable());
        assert_eq!(attempt.state(), ProvisioningState::Failed);
        assert!(!attempt.can_resubmit());
        let err = provisioner.submit(&mut attempt, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_signer_must_be_owner() {
        let (provisioner, chain) = provisioner(MockChain::new(config()));
        let mut attempt = provisioner.begin(policy());
        let stranger = LocalKeySigner::from_hex(OTHER_KEY).unwrap();

        let err = provisioner
            .provision(&mut attempt, &stranger, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::Signing(SigningError::SignerMismatch { expected, .. }) if expected == OWNER
        ));
        assert_eq!(attempt.state(), ProvisioningState::Failed);
        assert!(attempt.request().is_none());
        assert!(!attempt.can_resubmit());
        assert!(chain.submitted_payloads().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_node_is_retryable() {
        let (provisioner, chain) = provisioner(MockChain::new(config()));
        chain.fail_next_submissions(1);
        let mut attempt = provisioner.begin(policy());

        let err = provisioner
            .provision(&mut attempt, &owner_signer(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::Submission(SubmissionError::Chain(ChainError::Unavailable(_)))
        ));
        assert!(err.is_retryable());
        assert_eq!(attempt.state(), ProvisioningState::Failed);
        assert!(attempt.can_resubmit());
        let signed = attempt.request().cloned();

        let wallet = provisioner
            .provision(&mut attempt, &owner_signer(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(wallet, PREDICTED);
        assert_eq!(attempt.submissions(), 2);
        // The signed request is reused, never re-signed.
        assert_eq!(attempt.request().cloned(), signed);
    }

    #[tokio::test]
    async fn test_reverted_creation_can_be_resubmitted() {
        let (provisioner, chain) = provisioner(MockChain::new(config()));
        chain.revert_next();
        let mut attempt = provisioner.begin(policy());

        let err = provisioner
            .provision(&mut attempt, &owner_signer(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Submission(SubmissionError::Reverted(_))));
        let first_nonce = attempt.tx_handle().unwrap().nonce;

        provisioner.submit(&mut attempt, Duration::from_secs(5)).await.unwrap();
        assert!(attempt.is_confirmed());
        assert_ne!(attempt.tx_handle().unwrap().nonce, first_nonce);

        let payloads = chain.submitted_payloads();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0], payloads[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_timeout_is_retryable() {
        let (provisioner, _chain) =
            provisioner(MockChain::new(config()).with_receipt_delay(Duration::from_secs(60)));
        let mut attempt = provisioner.begin(policy());

        let err = provisioner
            .provision(&mut attempt, &owner_signer(), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ProvisionError::Submission(SubmissionError::Timeout(Duration::from_secs(1)))
        );
        assert!(attempt.can_resubmit());
        assert!(attempt.tx_handle().is_some());
        assert!(attempt.receipt().is_none());

        let wallet = provisioner
            .submit(&mut attempt, Duration::from_secs(120))
            .await
            .unwrap();
        assert_eq!(wallet, PREDICTED);
    }

    #[tokio::test]
    async fn test_unbounded_timeout_waits_without_deadline() {
        let (provisioner, _chain) = provisioner(MockChain::new(config()));
        let mut attempt = provisioner.begin(policy());

        let wallet = provisioner
            .provision(&mut attempt, &owner_signer(), Duration::MAX)
            .await
            .unwrap();
        assert_eq!(wallet, PREDICTED);
        assert!(attempt.is_confirmed());
        assert_eq!(attempt.submissions(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_attempts_are_independent() {
        let (provisioner, chain) = provisioner(MockChain::new(config()));
        let signer = Arc::new(owner_signer());

        let mut tasks = Vec::new();
        for salt in 1u64..=4 {
            let provisioner = provisioner.clone();
            let signer = Arc::clone(&signer);
            tasks.push(tokio::spawn(async move {
                let mut attempt = provisioner.begin(WalletPolicy::new(OWNER, U256::from(salt)));
                provisioner
                    .provision(&mut attempt, signer.as_ref(), Duration::from_secs(5))
                    .await
            }));
        }

        let mut wallets = Vec::new();
        for task in tasks {
            wallets.push(task.await.unwrap().unwrap());
        }
        assert_eq!(wallets[0], PREDICTED);
        assert_eq!(wallets[1], address!("10301c1307e250518aaa07b0df2638ae58374f7b"));
        wallets.sort();
        wallets.dedup();
        assert_eq!(wallets.len(), 4);
        assert_eq!(chain.submitted_payloads().len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_share_failure_budget() {
        let (provisioner, chain) = provisioner(MockChain::new(config()));
        chain.fail_next_submissions(2);
        let signer = Arc::new(owner_signer());

        let mut tasks = Vec::new();
        for salt in 1u64..=8 {
            let provisioner = provisioner.clone();
            let signer = Arc::clone(&signer);
            tasks.push(tokio::spawn(async move {
                let mut attempt = provisioner.begin(WalletPolicy::new(OWNER, U256::from(salt)));
                provisioner
                    .provision(&mut attempt, signer.as_ref(), Duration::from_secs(5))
                    .await
            }));
        }

        let mut unavailable = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => {}
                Err(ProvisionError::Submission(SubmissionError::Chain(ChainError::Unavailable(_)))) => {
                    unavailable += 1
                }
                Err(err) => panic!("unexpected failure: {err}"),
            }
        }
        assert_eq!(unavailable, 2);
        assert_eq!(chain.submitted_payloads().len(), 6);
    }

    // ---- raw transactions ----

    fn fixture() -> RawTxFixture {
        fixtures_from_json(FIXTURES_JSON).unwrap().remove(0)
    }

    #[test]
    fn test_decode_fixture_transaction() {
        let fixture = fixture();
        assert_eq!(fixture.id, "1");
        assert!(fixture.verbose);

        let tx = raw_tx::decode_hex(&fixture.content).unwrap();
        assert_eq!(tx.nonce, U256::from(1194u64));
        assert_eq!(tx.gas_price, U256::from(4_875_920_440u64));
        assert_eq!(tx.gas_limit, U256::from(500_000u64));
        assert_eq!(tx.to, Some(address!("8d8812b72d1e4ffcec158d25f56748b7d67c1e78")));
        assert!(!tx.is_contract_creation());
        assert_eq!(tx.value, U256::ZERO);
        assert_eq!(tx.data.len(), 1668);
        assert_eq!(&tx.data[..4], &[0xe7, 0x8a, 0xad, 0xb2]);
        assert_eq!(tx.v, 27);
        assert_eq!(tx.chain_id(), None);
        assert_eq!(
            tx.r,
            U256::from_be_bytes(b256!("11d205631fed47bb256beaeb77a761ec3684851659b880d6f46e0fd2952b3d6d").0)
        );
        assert_eq!(
            tx.s,
            U256::from_be_bytes(b256!("07efbf71ef8cb8beb6713765d96abd2e43fcb5593ad2cf6834b9fd398c11d267").0)
        );

        assert_eq!(raw_tx::encode_hex(&tx), fixture.content.to_lowercase());
        assert_eq!(
            tx.tx_hash(),
            b256!("c1eeee9e21f3171f663528a5ed524f122a20de2673a393eb42c62f66f5db6d15")
        );
        assert_eq!(
            tx.signing_hash(),
            b256!("02f8e4d8e58bbd643db204c7cfb7bddc09cfe9ec18bd7b4108238cfe94e1b368")
        );
        assert_eq!(
            tx.recover_sender().unwrap(),
            address!("3acdf3e3d8ec52a768083f718e763727b0210650")
        );
    }

    #[test]
    fn test_decode_traced_reports_field_positions() {
        let bytes = raw_tx::parse_hex(&fixture().content).unwrap();
        let (_, trace) = raw_tx::decode_traced(&bytes).unwrap();
        assert_eq!(trace.len(), 9);
        assert_eq!(trace[0].field, "nonce");
        assert_eq!(trace[0].offset, 3);
        assert_eq!(trace[0].payload_len, 2);
        assert_eq!(trace[5].field, "data");
        assert_eq!(trace[5].payload_len, 1668);
        let last = &trace[8];
        assert_eq!(last.offset + last.header_len + last.payload_len, bytes.len());
    }

    #[test]
    fn test_decode_rejects_malformed_transactions() {
        assert_eq!(raw_tx::decode(&[]).unwrap_err(), MalformedTxError::Empty);
        assert!(matches!(raw_tx::decode_hex("0xzz"), Err(MalformedTxError::Hex(_))));
        assert_eq!(raw_tx::decode(&[0x80]).unwrap_err(), MalformedTxError::NotAList);
        assert_eq!(raw_tx::decode(&[0xc1, 0x80]).unwrap_err(), MalformedTxError::FieldCount(1));

        let mut trailing = raw_tx::parse_hex(&fixture().content).unwrap();
        trailing.push(0x00);
        assert_eq!(raw_tx::decode(&trailing).unwrap_err(), MalformedTxError::TrailingBytes(1));

        let mut leading_zero = vec![0xc9, 0x00];
        leading_zero.extend_from_slice(&[0x80; 8]);
        assert_eq!(
            raw_tx::decode(&leading_zero).unwrap_err(),
            MalformedTxError::NonCanonical("nonce")
        );

        let mut long_form_byte = vec![0xca, 0x81, 0x05];
        long_form_byte.extend_from_slice(&[0x80; 8]);
        assert!(matches!(
            raw_tx::decode(&long_form_byte),
            Err(MalformedTxError::NonCanonical(_)) | Err(MalformedTxError::Rlp(_))
        ));

        let mut short_to = vec![0xcb, 0x80, 0x80, 0x80, 0x82, 0x01, 0x02];
        short_to.extend_from_slice(&[0x80; 5]);
        assert_eq!(
            raw_tx::decode(&short_to).unwrap_err(),
            MalformedTxError::InvalidDestination(2)
        );

        let mut nested = vec![0xc9, 0xc0];
        nested.extend_from_slice(&[0x80; 8]);
        assert_eq!(
            raw_tx::decode(&nested).unwrap_err(),
            MalformedTxError::UnexpectedList("nonce")
        );
    }

    #[test]
    fn test_decode_rejects_truncated_lengths() {
        let mut truncated = raw_tx::parse_hex(&fixture().content).unwrap();
        truncated.pop();
        assert!(matches!(raw_tx::decode(&truncated), Err(MalformedTxError::Rlp(_))));

        // List header claims 10 payload bytes, nine follow.
        let mut short_list = vec![0xca];
        short_list.extend_from_slice(&[0x80; 9]);
        assert!(matches!(raw_tx::decode(&short_list), Err(MalformedTxError::Rlp(_))));

        let mut long_item = vec![0xc9, 0x85];
        long_item.extend_from_slice(&[0x80; 7]);
        assert!(matches!(raw_tx::decode(&long_item), Err(MalformedTxError::Rlp(_))));

        // Last item claims five bytes past the end of an otherwise complete list.
        let mut overrun = vec![0xc9];
        overrun.extend_from_slice(&[0x80; 8]);
        overrun.push(0x85);
        assert!(matches!(raw_tx::decode(&overrun), Err(MalformedTxError::Rlp(_))));
    }

    #[test]
    fn test_eip155_transaction_recovers_sender() {
        let key = k256::ecdsa::SigningKey::from_slice(&hex::decode(&OTHER_KEY[2..]).unwrap()).unwrap();
        let mut tx = LegacyTransaction {
            nonce: U256::from(9u64),
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: U256::from(21_000u64),
            to: Some(address!("3535353535353535353535353535353535353535")),
            value: U256::from(1_000_000_000_000_000_000u64),
            data: Default::default(),
            v: 37,
            r: U256::ZERO,
            s: U256::ZERO,
        };
        assert_eq!(tx.chain_id(), Some(1));

        let signature = sign(&tx.signing_hash(), &key).unwrap();
        let bytes = signature.as_bytes();
        tx.r = U256::from_be_slice(&bytes[..32]);
        tx.s = U256::from_be_slice(&bytes[32..64]);
        tx.v = 37 + u64::from(bytes[64] - 27);
        assert_eq!(tx.chain_id(), Some(1));

        assert_eq!(
            tx.recover_sender().unwrap(),
            address!("7e5f4552091a69125d5dfcb7b8c2659029395bdf")
        );
        assert_eq!(raw_tx::decode(&raw_tx::encode(&tx)).unwrap(), tx);
    }

    #[test]
    fn test_contract_creation_has_empty_destination() {
        let tx = LegacyTransaction {
            nonce: U256::ZERO,
            gas_price: U256::from(1u64),
            gas_limit: U256::from(53_000u64),
            to: None,
            value: U256::ZERO,
            data: vec![0x60, 0x00].into(),
            v: 27,
            r: U256::from(1u64),
            s: U256::from(1u64),
        };
        let decoded = raw_tx::decode(&raw_tx::encode(&tx)).unwrap();
        assert!(decoded.is_contract_creation());
        assert_eq!(decoded, tx);
    }

    // ---- replay ----

    #[test]
    fn test_replay_fixture() {
        let summary = replay_fixture(&fixture()).unwrap();
        assert_eq!(summary.byte_len, 1776);
        assert_eq!(summary.sender, address!("3acdf3e3d8ec52a768083f718e763727b0210650"));
        assert_eq!(
            summary.tx_hash,
            b256!("c1eeee9e21f3171f663528a5ed524f122a20de2673a393eb42c62f66f5db6d15")
        );
        assert_eq!(replay_fixture(&fixture().verbose(true)).unwrap(), summary);
    }

    #[test]
    fn test_replay_continues_past_bad_fixtures() {
        let fixtures = vec![
            RawTxFixture::new("broken", "0xc180"),
            fixture(),
            RawTxFixture::new("not-hex", "0xq"),
        ];
        let report = replay_fixtures(&fixtures);

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 2);
        assert!(!report.is_clean());
        assert_eq!(report.outcomes[0].result, Err(MalformedTxError::FieldCount(1)));
        assert!(report.outcomes[1].result.is_ok());

        assert!(replay_fixtures(&[fixture()]).is_clean());
    }
}
