//! Script fragments the library needs to emit and probe: push operations,
//! the standard output templates, and bare multisig redeem scripts. No
//! script execution.

use crate::address::{to_base58_check, AddressVersions};
use crate::error::{Error, Result};
use crate::hashes::hash160;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

/// Appends the push opcode for `n_bytes` of data, followed by nothing.
/// PUSHDATA2/4 lengths are little endian.
pub fn op_push_data(n_bytes: usize) -> Vec<u8> {
    let mut rval = Vec::with_capacity(5);
    if n_bytes <= 0x4b {
        rval.push(n_bytes as u8);
    } else if n_bytes <= 0xff {
        rval.push(OP_PUSHDATA1);
        rval.push(n_bytes as u8);
    } else if n_bytes <= 0xffff {
        rval.push(OP_PUSHDATA2);
        rval.extend_from_slice(&(n_bytes as u16).to_le_bytes());
    } else {
        rval.push(OP_PUSHDATA4);
        rval.extend_from_slice(&(n_bytes as u32).to_le_bytes());
    }
    rval
}

/// Appends `data` to `script` as a single push operation.
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    script.extend_from_slice(&op_push_data(data.len()));
    script.extend_from_slice(data);
}

/// Reads one push operation at `pos`, advancing `pos` past opcode and data.
pub fn read_push<'a>(script: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    let op = *script.get(*pos).ok_or(Error::Truncated)?;
    *pos += 1;
    let size = match op {
        n if n <= 0x4b => n as usize,
        OP_PUSHDATA1 => {
            let n = *script.get(*pos).ok_or(Error::Truncated)? as usize;
            *pos += 1;
            n
        }
        OP_PUSHDATA2 => {
            let bytes: [u8; 2] =
                script.get(*pos..*pos + 2).ok_or(Error::Truncated)?.try_into().unwrap();
            *pos += 2;
            u16::from_le_bytes(bytes) as usize
        }
        OP_PUSHDATA4 => {
            let bytes: [u8; 4] =
                script.get(*pos..*pos + 4).ok_or(Error::Truncated)?.try_into().unwrap();
            *pos += 4;
            u32::from_le_bytes(bytes) as usize
        }
        other => return Err(Error::malformed(format!("opcode {other:#04x} is not push data"))),
    };
    let data = script.get(*pos..*pos + size).ok_or(Error::Truncated)?;
    *pos += size;
    Ok(data)
}

/// Decomposes a script consisting solely of push operations.
pub fn split_pushes(script: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut objects = vec![];
    let mut pos = 0;
    while pos < script.len() {
        objects.push(read_push(script, &mut pos)?.to_vec());
    }
    Ok(objects)
}

/// Collects the pushed data of an arbitrary script, stepping over non-push
/// opcodes. Stops at a truncated push.
pub fn extract_pushes(script: &[u8]) -> Vec<Vec<u8>> {
    let mut objects = vec![];
    let mut pos = 0;
    while pos < script.len() {
        if script[pos] <= OP_PUSHDATA4 {
            match read_push(script, &mut pos) {
                Ok(data) => objects.push(data.to_vec()),
                Err(_) => break,
            }
        } else {
            pos += 1;
        }
    }
    objects
}

/// `DUP HASH160 <pubKeyHash> EQUALVERIFY CHECKSIG`
pub fn p2pkh_script(pub_key_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    push_data(&mut script, pub_key_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// `HASH160 <scriptHash> EQUAL`
pub fn p2sh_script(script_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.push(OP_HASH160);
    push_data(&mut script, script_hash);
    script.push(OP_EQUAL);
    script
}

/// The standard output forms the library can recognize and spend.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptKind {
    /// Pay to public key hash.
    PubKeyHash([u8; 20]),
    /// Pay to script hash.
    ScriptHash([u8; 20]),
    /// Bare pay to public key (33 or 65 byte key followed by CHECKSIG).
    PubKey(Vec<u8>),
    Unknown,
}

pub fn classify(script_pub_key: &[u8]) -> ScriptKind {
    if script_pub_key.len() == 25
        && script_pub_key[0] == OP_DUP
        && script_pub_key[1] == OP_HASH160
        && script_pub_key[2] == 0x14
        && script_pub_key[23] == OP_EQUALVERIFY
        && script_pub_key[24] == OP_CHECKSIG
    {
        return ScriptKind::PubKeyHash(script_pub_key[3..23].try_into().unwrap());
    }

    if script_pub_key.len() == 23
        && script_pub_key[0] == OP_HASH160
        && script_pub_key[1] == 0x14
        && script_pub_key[22] == OP_EQUAL
    {
        return ScriptKind::ScriptHash(script_pub_key[2..22].try_into().unwrap());
    }

    for key_len in [65_usize, 33] {
        if script_pub_key.len() == key_len + 2
            && script_pub_key[0] == key_len as u8
            && script_pub_key[key_len + 1] == OP_CHECKSIG
        {
            return ScriptKind::PubKey(script_pub_key[1..=key_len].to_vec());
        }
    }

    ScriptKind::Unknown
}

/// `OP_m <pubKey>...<pubKey> OP_n OP_CHECKMULTISIG`
#[derive(Clone, Debug, PartialEq)]
pub struct MultiSigRedeemScript {
    min_sigs: usize,
    pub_keys: Vec<Vec<u8>>,
}

impl MultiSigRedeemScript {
    pub fn new(min_sigs: usize) -> Result<Self> {
        if min_sigs < 1 {
            return Err(Error::InvalidRedeemScript("at least one signature is required".into()));
        }
        if min_sigs > 16 {
            return Err(Error::InvalidRedeemScript("at most 16 signatures are allowed".into()));
        }
        Ok(MultiSigRedeemScript { min_sigs, pub_keys: vec![] })
    }

    pub fn min_sigs(&self) -> usize {
        self.min_sigs
    }

    pub fn pub_keys(&self) -> &[Vec<u8>] {
        &self.pub_keys
    }

    pub fn add_pub_key(&mut self, pub_key: Vec<u8>) -> Result<()> {
        if self.pub_keys.len() >= 16 {
            return Err(Error::InvalidRedeemScript("public key maximum of 16 already reached".into()));
        }
        if pub_key.len() > 75 {
            return Err(Error::InvalidRedeemScript("public keys can be a maximum of 75 bytes".into()));
        }
        if self.pub_keys.contains(&pub_key) {
            return Err(Error::DuplicatePublicKey);
        }
        self.pub_keys.push(pub_key);
        Ok(())
    }

    pub fn parse(redeem_script: &[u8]) -> Result<Self> {
        if redeem_script.len() < 3 {
            return Err(Error::InvalidRedeemScript("redeem script is too short".into()));
        }

        let m_op = redeem_script[0];
        if !(OP_1..=OP_16).contains(&m_op) {
            return Err(Error::InvalidRedeemScript("invalid signature minimum".into()));
        }
        let min_sigs = (m_op - 0x50) as usize;

        let mut pub_keys: Vec<Vec<u8>> = vec![];
        let mut i = 1;
        loop {
            if i >= redeem_script.len() {
                return Err(Error::InvalidRedeemScript("script terminates prematurely".into()));
            }
            let byte = redeem_script[i];
            i += 1;
            if i >= redeem_script.len() {
                return Err(Error::InvalidRedeemScript("script terminates prematurely".into()));
            }
            if (OP_1..=OP_16).contains(&byte) {
                // the key counter
                if (byte - 0x50) as usize != pub_keys.len() {
                    return Err(Error::InvalidRedeemScript("invalid signature count".into()));
                }
                if pub_keys.len() < min_sigs {
                    return Err(Error::InvalidRedeemScript(
                        "the required signature minimum exceeds the number of keys".into(),
                    ));
                }
                if redeem_script[i] != OP_CHECKMULTISIG || i + 1 != redeem_script.len() {
                    return Err(Error::InvalidRedeemScript("invalid script termination".into()));
                }
                break;
            }
            // the key length
            let key_len = byte as usize;
            if byte > 0x4b || i + key_len > redeem_script.len() {
                return Err(Error::InvalidRedeemScript(format!("invalid op at byte {}", i - 1)));
            }
            if pub_keys.len() >= 16 {
                return Err(Error::InvalidRedeemScript("public key maximum of 16 exceeded".into()));
            }
            pub_keys.push(redeem_script[i..i + key_len].to_vec());
            i += key_len;
        }

        Ok(MultiSigRedeemScript { min_sigs, pub_keys })
    }

    pub fn to_script(&self) -> Result<Vec<u8>> {
        if self.min_sigs > self.pub_keys.len() {
            return Err(Error::InvalidRedeemScript("insufficient public keys".into()));
        }

        let mut script = vec![(self.min_sigs + 0x50) as u8];
        for pub_key in &self.pub_keys {
            script.push(pub_key.len() as u8);
            script.extend_from_slice(pub_key);
        }
        script.push((self.pub_keys.len() + 0x50) as u8);
        script.push(OP_CHECKMULTISIG);
        Ok(script)
    }

    /// The pay-to-script-hash address of this redeem script.
    pub fn address(&self, versions: &AddressVersions) -> Result<String> {
        Ok(to_base58_check(&hash160(&self.to_script()?), versions.multisig))
    }
}

#[cfg(test)]
mod test {
    use hex_literal::hex;
    use rstest::*;

    use super::*;

    #[rstest]
    #[case(0, & [0x00])]
    #[case(0x4b, & [0x4b])]
    #[case(0x4c, & [0x4c, 0x4c])]
    #[case(0xff, & [0x4c, 0xff])]
    #[case(0x100, & [0x4d, 0x00, 0x01])]
    fn test_op_push_data(#[case] n: usize, #[case] expected: &[u8]) {
        assert_eq!(op_push_data(n), expected);
    }

    #[test]
    fn test_split_pushes() {
        let mut script = vec![];
        push_data(&mut script, &[]);
        push_data(&mut script, &[0xaa; 3]);
        push_data(&mut script, &[0xbb; 80]); // forces PUSHDATA1

        let objects = split_pushes(&script).unwrap();
        assert_eq!(objects.len(), 3);
        assert!(objects[0].is_empty());
        assert_eq!(objects[1], vec![0xaa; 3]);
        assert_eq!(objects[2], vec![0xbb; 80]);
    }

    #[test]
    fn test_split_pushes_rejects_non_push() {
        assert!(split_pushes(&[OP_DUP]).is_err());
        assert!(matches!(split_pushes(&[0x05, 0x01]), Err(Error::Truncated)));
    }

    #[test]
    fn test_classify_standard_scripts() {
        let pkh = [0x11; 20];
        assert_eq!(classify(&p2pkh_script(&pkh)), ScriptKind::PubKeyHash(pkh));

        let sh = [0x22; 20];
        assert_eq!(classify(&p2sh_script(&sh)), ScriptKind::ScriptHash(sh));

        let mut p2pk = vec![33_u8];
        p2pk.extend_from_slice(&[0x02; 33]);
        p2pk.push(OP_CHECKSIG);
        assert_eq!(classify(&p2pk), ScriptKind::PubKey(vec![0x02; 33]));

        assert_eq!(classify(&[OP_DUP, OP_DUP]), ScriptKind::Unknown);
    }

    #[test]
    fn test_multisig_round_trip() {
        let mut multisig = MultiSigRedeemScript::new(2).unwrap();
        multisig.add_pub_key(vec![0x02; 33]).unwrap();
        multisig.add_pub_key(vec![0x03; 33]).unwrap();
        multisig.add_pub_key(vec![0x04; 33]).unwrap();

        let script = multisig.to_script().unwrap();
        assert_eq!(script[0], 0x52); // OP_2
        assert_eq!(script[script.len() - 2], 0x53); // OP_3
        assert_eq!(script[script.len() - 1], OP_CHECKMULTISIG);

        let parsed = MultiSigRedeemScript::parse(&script).unwrap();
        assert_eq!(parsed, multisig);
    }

    #[test]
    fn test_multisig_parse_real_script() {
        let script = hex!(
            "5221037d32081bf4a1be6e8f2d5dbb98ee9408bd0559988f4c5a779dc40d92b6251a80"
            "21021574b25c88eb3c407bf2f9d18221a6bf15bf69ed5c120012300706c141f966e9"
            "52ae"
        );
        let multisig = MultiSigRedeemScript::parse(&script).unwrap();
        assert_eq!(multisig.min_sigs(), 2);
        assert_eq!(multisig.pub_keys().len(), 2);
        assert_eq!(multisig.to_script().unwrap(), script);
    }

    #[rstest]
    #[case(& [0x52, 0xae][..], "too short")]
    #[case(& [0x20, 0x51, 0xae], "bad minimum")]
    #[case(& [0x52, 0x51, 0xae], "m exceeds n")]
    #[case(& [0x51, 0x21, 0x51, 0xae], "truncated key")]
    fn test_multisig_parse_rejects(#[case] script: &[u8], #[case] _why: &str) {
        assert!(matches!(
            MultiSigRedeemScript::parse(script),
            Err(Error::InvalidRedeemScript(_))
        ));
    }

    #[test]
    fn test_multisig_limits() {
        assert!(MultiSigRedeemScript::new(0).is_err());
        assert!(MultiSigRedeemScript::new(17).is_err());

        let mut multisig = MultiSigRedeemScript::new(1).unwrap();
        assert!(multisig.add_pub_key(vec![0x02; 76]).is_err());
        multisig.add_pub_key(vec![0x02; 33]).unwrap();
        assert!(matches!(
            multisig.add_pub_key(vec![0x02; 33]),
            Err(Error::DuplicatePublicKey)
        ));

        // more required signatures than keys
        let two_of_none = MultiSigRedeemScript::new(2).unwrap();
        assert!(two_of_none.to_script().is_err());
    }
}
