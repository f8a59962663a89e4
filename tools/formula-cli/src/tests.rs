#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use alloy_primitives::{Address, U256};
    use clap::{CommandFactory, Parser};
    use formula_engine::{
        signing::{address_of, signing_key_from_hex, validate_signatures},
        FormulaBuilder,
    };
    use formula_types::{selector, Operation};
    use serde_json::json;

    use crate::{
        emit_report, hash_report, rpc::contains_push4, sign, staging_path, Cli, Command, KeyArgs,
    };

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::try_parse_from([
            "formula-cli",
            "analyze",
            "--formula",
            "0x00",
            "--settlement",
            "0x0000000000000000000000000000000000000001",
            "--stop-on-already-executed",
        ])
        .unwrap();
        match cli.command {
            Command::Analyze { stop_on_already_executed, output, .. } => {
                assert!(stop_on_already_executed);
                assert!(output.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_key_sources_conflict() {
        let res = Cli::try_parse_from([
            "formula-cli",
            "sign",
            "--formula",
            "0x00",
            "--endpoint",
            "0",
            "--private-key",
            KEY,
            "--private-key-path",
            "key.txt",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_staging_path() {
        assert_eq!(
            staging_path(Path::new("out/analysis.json")),
            Path::new("out/.analysis.json.partial")
        );
        assert_eq!(staging_path(Path::new("analysis.json")), Path::new(".analysis.json.partial"));
    }

    #[test]
    fn test_emit_report_to_file() {
        let dir = std::env::temp_dir().join(format!("formula-cli-report-{}", std::process::id()));
        let path = dir.join("nested").join("report.json");
        let report = json!({ "analysis": { "isComplete": false } });

        emit_report(&report, Some(&path)).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, report);
        assert!(!staging_path(&path).exists());

        // a second run replaces the file
        let rerun = json!({ "analysis": { "isComplete": true } });
        emit_report(&rerun, Some(&path)).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, rerun);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_contains_push4() {
        let transfer_from = selector("transferFrom(address,address,uint256)");
        let mut code = vec![0x60, 0x80, 0x60, 0x40, 0x63];
        code.extend_from_slice(&transfer_from);
        code.push(0x14);
        assert!(contains_push4(&code, transfer_from));

        // same bytes without the PUSH4 opcode in front
        let mut bare = vec![0x60, 0x80];
        bare.extend_from_slice(&transfer_from);
        assert!(!contains_push4(&bare, transfer_from));
        assert!(!contains_push4(&[], transfer_from));
    }

    #[test]
    fn test_hash_report_lists_signed_endpoints() {
        let formula = FormulaBuilder::new()
            .endpoints([Address::repeat_byte(1), Address::repeat_byte(2)])
            .signed_endpoint_count(1)
            .operation(Operation::SendEther { from: 0, to: 1, amount: U256::from(10u64) })
            .build()
            .unwrap();

        let report = hash_report(&formula);
        assert_eq!(report["messageHash"], json!(formula.message_hash()));
        let endpoints = report["signedEndpoints"].as_array().unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0]["signed"], json!(false));
        assert_eq!(endpoints[0]["messageToSign"], json!(formula.message_to_sign(0)));
    }

    #[test]
    fn test_sign_with_inline_key() {
        let key = signing_key_from_hex(KEY).unwrap();
        let formula = FormulaBuilder::new()
            .endpoint(address_of(&key))
            .signed_endpoint_count(1)
            .operation(Operation::PayFee { from: 0, amount: U256::from(1u64) })
            .build()
            .unwrap();

        let args = KeyArgs { private_key_path: None, private_key: Some(KEY.to_string()) };
        let signed = sign(&formula, 0, &args).unwrap();

        assert!(signed.is_signed(0));
        assert_eq!(signed.message_hash(), formula.message_hash());
        assert!(validate_signatures(&signed, &[]).is_valid);
    }

    #[test]
    fn test_sign_without_key() {
        let formula = FormulaBuilder::new()
            .endpoint(Address::repeat_byte(1))
            .signed_endpoint_count(1)
            .build()
            .unwrap();
        let args = KeyArgs { private_key_path: None, private_key: None };
        assert!(sign(&formula, 0, &args).is_err());
    }
}
