use serde_derive::Deserialize;
use crate::ID;

#[derive(Debug, thiserror::Error)]
pub enum MetaInfoError {

    #[error("bencode error whilst decoding metainfo: {0}")]
    BencodeError(#[from] bencode::Error),

    #[error("invalid file extension, expected .torrent")]
    InvalidExtension,

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("invalid pieces length, must be a multiple of 20")]
    InvalidPiecesLength,

    #[error("piece length must be positive")]
    ZeroPieceLength,

    #[error("multi-file torrents are not supported")]
    MultiFile,

    #[error("info dict has no length")]
    MissingLength,

    #[error("expected {expected} piece hashes for the file length, found {actual}")]
    PieceCountMismatch {
        expected: u64,
        actual: u64,
    },
}

#[derive(Clone, Deserialize)]
pub struct Info {

    // Suggested file name.
    pub name: String,

    // String consisting of the concatenation of all 20-byte SHA1 hash values, one per piece.
    #[serde(with = "serde_bytes")]
    pub pieces: Vec<u8>,

    // Number of bytes in each piece (integer).
    #[serde(rename = "piece length")]
    pub piece_length: u64,

    // Length of the file in bytes (integer).
    #[serde(default)]
    pub length: Option<u64>,

    // A 32-character hexadecimal string corresponding to the MD5 sum of the file.
    #[serde(default)]
    pub md5sum: Option<String>,

    // Only kept to reject multi-file torrents.
    #[serde(default)]
    pub files: Option<bencode::Value>,

    // If set to 1 peers must only come from the trackers in the metainfo.
    #[serde(default)]
    pub private: Option<u8>,

}

#[derive(Deserialize, Clone)]
pub struct MetaInfo {

    // The announce URL of the tracker (string).
    #[serde(deserialize_with = "crate::de::url_deserialize")]
    pub announce: url::Url,

    // A dictionary that describes the file of the torrent.
    pub info: Info,

    // sha1 hash of the bencoded info dict.
    #[serde(skip)]
    pub info_hash: ID,

    // (optional) the string encoding format used to generate the pieces part of the info
    // dictionary in the .torrent metafile (string).
    #[serde(default)]
    pub encoding: Option<String>,

    // (optional) tiers of backup trackers.
    #[serde(default)]
    #[serde(rename = "announce-list")]
    #[serde(deserialize_with = "crate::de::announce_list_deserialize")]
    pub announce_list: Option<Vec<Vec<url::Url>>>,

    // (optional) the creation time of the torrent, in standard UNIX epoch format.
    #[serde(default)]
    #[serde(rename = "creation date")]
    pub creation_date: Option<i64>,

    // (optional) free-form textual comments of the author (string).
    #[serde(default)]
    pub comment: Option<String>,

    // (optional) name and version of the program used to create the .torrent (string).
    #[serde(default)]
    #[serde(rename = "created by")]
    pub created_by: Option<String>,

}

impl MetaInfo {

    pub fn new<P: AsRef<std::path::Path>>(path: P) -> Result<MetaInfo, MetaInfoError> {

        if path.as_ref().extension().unwrap_or_default() != "torrent" {
            return Err(MetaInfoError::InvalidExtension);
        }
        Self::from_bytes(&std::fs::read(path)?)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<MetaInfo, MetaInfoError> {

        let mut metainfo: MetaInfo = bencode::decode_bytes(raw)?;
        metainfo.validate()?;

        // The hash is taken over the info dict as it appears in the file, so decode it
        // generically rather than re-encoding the typed struct, which drops unknown keys.
        let raw_value: bencode::Value = bencode::decode_bytes(raw)?;
        let info = raw_value
            .get("info")
            .ok_or_else(|| bencode::Error::Custom("missing info dict".to_string()))?;
        metainfo.info_hash = info_hash(info)?;

        tracing::debug!("metainfo created: {:#?}", metainfo);
        Ok(metainfo)
    }

    fn validate(&self) -> Result<(), MetaInfoError> {
        let info = &self.info;
        if info.files.is_some() {
            return Err(MetaInfoError::MultiFile);
        }
        // Empty pieces are only valid for an empty file, which the count check covers.
        if info.pieces.len() % 20 != 0 {
            return Err(MetaInfoError::InvalidPiecesLength);
        }
        if info.piece_length == 0 {
            return Err(MetaInfoError::ZeroPieceLength);
        }
        let length = info.length.ok_or(MetaInfoError::MissingLength)?;
        let expected = length.div_ceil(info.piece_length);
        let actual = info.pieces.len() as u64 / 20;
        if expected != actual {
            return Err(MetaInfoError::PieceCountMismatch { expected, actual });
        }
        Ok(())
    }

    pub fn piece_hashes(&self) -> Vec<ID> {
        self.info.pieces
            .chunks_exact(20)
            .map(|c| {
                let mut hash = [0; 20];
                hash.copy_from_slice(c);
                hash
            })
            .collect()
    }

    pub fn piece_len(&self) -> usize { self.info.piece_length as usize }

    pub fn num_pieces(&self) -> u32 { self.info.pieces.len() as u32 / 20 }

    // Validated as present in from_bytes.
    pub fn total_len(&self) -> u64 { self.info.length.unwrap_or(0) }

    pub fn info_hash(&self) -> ID { self.info_hash }

    pub fn name(&self) -> &str { &self.info.name }

    // Announce url first, then the announce list in tier order. Only http(s) trackers.
    pub fn tracker_urls(&self) -> Vec<url::Url> {
        let mut urls = vec![self.announce.clone()];
        for url in self.announce_list.iter().flatten().flatten() {
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
        urls.retain(|url| matches!(url.scheme(), "http" | "https"));
        urls
    }

    // Formatting methods.

    pub fn creation_date_fmt(&self) -> Option<String> {
        self.creation_date.map(|v| {
            chrono::DateTime::from_timestamp(v, 0)
                .map(|date| date.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "Invalid date".to_string())
        })
    }

    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    pub fn size_fmt(&self) -> String {
        format_size(self.total_len())
    }
}

fn info_hash(info: &bencode::Value) -> Result<ID, bencode::Error> {
    use sha1::Digest;
    let mut hasher = sha1::Sha1::new();
    hasher.update(bencode::encode_to_raw(info)?);
    Ok(hasher.finalize().into())
}

pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = "B";
    for next in ["KiB", "MiB", "GiB", "TiB"] {
        if size <= 1024.0 {
            break;
        }
        size /= 1024.0;
        unit = next;
    }
    format!("{:.2} {}", size, unit)
}

impl std::fmt::Debug for MetaInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaInfo")
            .field("announce", &self.announce.as_str())
            .field("info", &self.info)
            .field("info_hash", &self.info_hash_hex())
            .field("encoding", &self.encoding)
            .field("announce_list", &self.announce_list.as_ref().map(|tiers|
                tiers.iter().map(|tier|
                    tier.iter().map(url::Url::as_str).collect()
                ).collect::<Vec<Vec<&str>>>()
            ))
            .field("creation_date", &self.creation_date_fmt())
            .field("comment", &self.comment)
            .field("created_by", &self.created_by)
            .finish()
    }
}

// Dont want to print out the pieces field, so we implement Debug manually.
impl std::fmt::Debug for Info {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Info")
            .field("name", &self.name)
            .field("num pieces", &(self.pieces.len() / 20))
            .field("piece_length", &self.piece_length)
            .field("length", &self.length)
            .field("md5sum", &self.md5sum)
            .field("private", &self.private)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use std::io::Write;
    use bencode::Value;
    use sha1::{Digest, Sha1};
    use super::{*, fixtures::*};

    #[test]
    fn test_metainfo() {
        let data = vec![7u8; 100];
        let raw = torrent_for("http://tracker.example/announce", "file.bin", &data, 32);
        let metainfo = MetaInfo::from_bytes(&raw).unwrap();
        assert_eq!(metainfo.num_pieces(), 4);
        assert_eq!(metainfo.piece_len(), 32);
        assert_eq!(metainfo.total_len(), 100);
        assert_eq!(metainfo.name(), "file.bin");
        let hashes = metainfo.piece_hashes();
        assert_eq!(hashes.len(), 4);
        assert_eq!(hashes[3], <[u8; 20]>::from(Sha1::digest(&data[96..])));
    }

    #[test]
    fn test_info_hash_covers_unknown_keys() {
        let info = dict(vec![
            ("name", bytes("a")),
            ("length", Value::Integer(4)),
            ("piece length", Value::Integer(4)),
            ("pieces", bytes([1u8; 20])),
            ("x-custom", bytes("kept")),
        ]);
        let expected: [u8; 20] = Sha1::digest(bencode::encode_to_raw(&info).unwrap()).into();
        let raw = bencode::encode_to_raw(&dict(vec![
            ("announce", bytes("http://t.example/a")),
            ("info", info),
        ])).unwrap();
        let metainfo = MetaInfo::from_bytes(&raw).unwrap();
        assert_eq!(metainfo.info_hash(), expected);
        assert_eq!(metainfo.info_hash_hex(), hex::encode(expected));
    }

    #[test]
    fn test_rejects_multi_file() {
        let info = dict(vec![
            ("name", bytes("dir")),
            ("piece length", Value::Integer(4)),
            ("pieces", bytes([1u8; 20])),
            ("files", Value::List(vec![dict(vec![
                ("length", Value::Integer(4)),
                ("path", Value::List(vec![bytes("a")])),
            ])])),
        ]);
        let raw = bencode::encode_to_raw(&dict(vec![
            ("announce", bytes("http://t.example/a")),
            ("info", info),
        ])).unwrap();
        assert!(matches!(MetaInfo::from_bytes(&raw), Err(MetaInfoError::MultiFile)));
    }

    #[test]
    fn test_rejects_piece_count_mismatch() {
        let info = dict(vec![
            ("name", bytes("a")),
            ("length", Value::Integer(100)),
            ("piece length", Value::Integer(32)),
            ("pieces", bytes([1u8; 60])),
        ]);
        let raw = bencode::encode_to_raw(&dict(vec![
            ("announce", bytes("http://t.example/a")),
            ("info", info),
        ])).unwrap();
        assert!(matches!(
            MetaInfo::from_bytes(&raw),
            Err(MetaInfoError::PieceCountMismatch { expected: 4, actual: 3 })
        ));
    }

    #[test]
    fn test_rejects_bad_pieces_length() {
        let info = dict(vec![
            ("name", bytes("a")),
            ("length", Value::Integer(4)),
            ("piece length", Value::Integer(4)),
            ("pieces", bytes([1u8; 19])),
        ]);
        let raw = bencode::encode_to_raw(&dict(vec![
            ("announce", bytes("http://t.example/a")),
            ("info", info),
        ])).unwrap();
        assert!(matches!(MetaInfo::from_bytes(&raw), Err(MetaInfoError::InvalidPiecesLength)));
    }

    #[test]
    fn test_empty_file() {
        let raw = torrent_for("http://t.example/a", "empty", &[], 16);
        let metainfo = MetaInfo::from_bytes(&raw).unwrap();
        assert_eq!(metainfo.num_pieces(), 0);
        assert_eq!(metainfo.total_len(), 0);
        assert!(metainfo.piece_hashes().is_empty());
    }

    #[test]
    fn test_rejects_missing_pieces_for_non_empty_file() {
        let info = dict(vec![
            ("name", bytes("a")),
            ("length", Value::Integer(4)),
            ("piece length", Value::Integer(4)),
            ("pieces", bytes(b"")),
        ]);
        let raw = bencode::encode_to_raw(&dict(vec![
            ("announce", bytes("http://t.example/a")),
            ("info", info),
        ])).unwrap();
        assert!(matches!(
            MetaInfo::from_bytes(&raw),
            Err(MetaInfoError::PieceCountMismatch { expected: 1, actual: 0 })
        ));
    }

    #[test]
    fn test_tracker_urls() {
        let data = [0u8; 10];
        let raw = torrent_for("http://a.example/announce", "f", &data, 16);
        let mut value: Value = bencode::decode_bytes(&raw).unwrap();
        if let Value::Dict(d) = &mut value {
            d.insert(b"announce-list".to_vec(), Value::List(vec![
                Value::List(vec![bytes("http://a.example/announce"), bytes("udp://b.example:80")]),
                Value::List(vec![bytes("https://c.example/announce"), bytes("not a url")]),
            ]));
        }
        let metainfo = MetaInfo::from_bytes(&bencode::encode_to_raw(&value).unwrap()).unwrap();
        let urls: Vec<String> = metainfo.tracker_urls().iter().map(|u| u.to_string()).collect();
        assert_eq!(urls, vec!["http://a.example/announce", "https://c.example/announce"]);
    }

    #[test]
    fn test_new_from_file() {
        let raw = torrent_for("http://t.example/a", "f", &[1, 2, 3], 2);
        let mut file = tempfile::Builder::new().suffix(".torrent").tempfile().unwrap();
        file.write_all(&raw).unwrap();
        let metainfo = MetaInfo::new(file.path()).unwrap();
        assert_eq!(metainfo.num_pieces(), 2);
        assert!(matches!(MetaInfo::new("file.txt"), Err(MetaInfoError::InvalidExtension)));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512.00 B");
        assert_eq!(format_size(2048), "2.00 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MiB");
    }
}
