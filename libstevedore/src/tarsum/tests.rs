use super::*;
use flate2::read::GzDecoder;

fn file_header(name: &str, data: &[u8]) -> tar::Header {
    let mut header = tar::Header::new_ustar();
    header.set_path(name).unwrap();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(1234567890);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    header
}

fn build_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in entries {
        let header = file_header(name, data);
        builder.append(&header, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

fn sum_of(archive: &[u8]) -> String {
    let mut tarsum = TarSum::new(archive, false);
    let mut out = Vec::new();
    tarsum.read_to_end(&mut out).unwrap();
    tarsum.sum(b"").unwrap()
}

#[test]
fn test_sum_type_parsing() {
    assert_eq!("sha256".parse::<SumType>().unwrap(), SumType::Sha256);
    assert_eq!(
        "tarsum+sha256".parse::<SumType>().unwrap(),
        SumType::TarsumSha256
    );
    assert_eq!(SumType::TarsumSha256.to_string(), "tarsum+sha256");

    let err = "md5".parse::<SumType>().unwrap_err();
    assert!(matches!(err, StevedoreError::SumTypeNotSupported { .. }));
}

#[test]
fn test_parse_checksum() {
    let (sum_type, hex) = parse_checksum("sha256:deadbeef").unwrap();
    assert_eq!(sum_type, SumType::Sha256);
    assert_eq!(hex, "deadbeef");

    let (sum_type, _) = parse_checksum("tarsum+sha256:deadbeef").unwrap();
    assert_eq!(sum_type, SumType::TarsumSha256);

    assert!(parse_checksum("deadbeef").is_err());
    assert!(parse_checksum("sha256:").is_err());
    assert!(parse_checksum("md5:deadbeef").is_err());
}

#[test]
fn test_checksum_format() {
    let archive = build_tar(&[("hello.txt", b"hello world")]);
    let checksum = sum_of(&archive);
    assert!(checksum.starts_with("tarsum+sha256:"));
    assert_eq!(checksum.len(), "tarsum+sha256:".len() + 64);
}

#[test]
fn test_passthrough_is_byte_identical() {
    let archive = build_tar(&[("a.txt", b"first"), ("b.txt", b"second")]);

    let mut tarsum = TarSum::new(archive.as_slice(), false);
    let mut out = Vec::new();
    tarsum.read_to_end(&mut out).unwrap();

    assert_eq!(out, archive);
    assert!(tarsum.is_finished());
}

#[test]
fn test_entry_order_does_not_change_sum() {
    let forward = build_tar(&[("a.txt", b"first"), ("b.txt", b"second")]);
    let reverse = build_tar(&[("b.txt", b"second"), ("a.txt", b"first")]);

    assert_eq!(sum_of(&forward), sum_of(&reverse));
}

#[test]
fn test_content_changes_sum() {
    let one = build_tar(&[("a.txt", b"first")]);
    let other = build_tar(&[("a.txt", b"FIRST")]);
    let renamed = build_tar(&[("b.txt", b"first")]);

    assert_ne!(sum_of(&one), sum_of(&other));
    assert_ne!(sum_of(&one), sum_of(&renamed));
}

#[test]
fn test_gzip_output_preserves_sum_and_content() {
    let archive = build_tar(&[("a.txt", b"first"), ("b.txt", b"second")]);

    let mut tarsum = TarSum::new(archive.as_slice(), true);
    let mut compressed = Vec::new();
    tarsum.read_to_end(&mut compressed).unwrap();

    let mut decompressed = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut decompressed)
        .unwrap();
    assert_eq!(decompressed, archive);

    assert_eq!(tarsum.sum(b"").unwrap(), sum_of(&archive));
}

#[test]
fn test_extra_bytes_change_sum() {
    let archive = build_tar(&[("a.txt", b"first")]);

    let mut tarsum = TarSum::new(archive.as_slice(), false);
    let mut out = Vec::new();
    tarsum.read_to_end(&mut out).unwrap();

    let plain = tarsum.sum(b"").unwrap();
    let with_extra = tarsum.sum(br#"{"id":"abc"}"#).unwrap();
    assert_ne!(plain, with_extra);

    // Same extra bytes reproduce the same sum.
    assert_eq!(with_extra, tarsum.sum(br#"{"id":"abc"}"#).unwrap());
}

#[test]
fn test_sum_before_drain_is_an_error() {
    let archive = build_tar(&[("a.txt", b"first")]);
    let mut tarsum = TarSum::new(archive.as_slice(), false);

    assert!(!tarsum.is_finished());
    assert!(tarsum.sum(b"").is_err());

    // Reading part of the stream is not enough.
    let mut partial = [0u8; 512];
    tarsum.read_exact(&mut partial).unwrap();
    assert!(tarsum.sum(b"").is_err());
}

#[test]
fn test_entry_keys_are_cleaned() {
    let mut builder = tar::Builder::new(Vec::new());

    let mut dir = tar::Header::new_ustar();
    dir.set_path("dir/").unwrap();
    dir.set_size(0);
    dir.set_mode(0o755);
    dir.set_mtime(0);
    dir.set_entry_type(tar::EntryType::Directory);
    dir.set_cksum();
    builder.append(&dir, &[][..]).unwrap();

    let file = file_header("./dir/file.txt", b"data");
    builder.append(&file, &b"data"[..]).unwrap();
    let archive = builder.into_inner().unwrap();

    let mut tarsum = TarSum::new(archive.as_slice(), false);
    let mut out = Vec::new();
    tarsum.read_to_end(&mut out).unwrap();

    assert!(tarsum.sums().contains_key("dir"));
    assert!(tarsum.sums().contains_key("dir/file.txt"));
}

#[test]
fn test_empty_numeric_header_fields_read_as_zero() {
    // A header whose uid/gid/mode/mtime fields are left as NUL padding is
    // valid tar; readers treat the empty octal fields as zero.
    let mut bare = tar::Header::new_ustar();
    bare.set_path("etc/hostname").unwrap();
    bare.set_size(5);
    bare.set_entry_type(tar::EntryType::Regular);
    bare.set_cksum();

    let mut explicit = file_header("etc/hostname", b"moon\n");
    explicit.set_mode(0);
    explicit.set_mtime(0);
    explicit.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&bare, &b"moon\n"[..]).unwrap();
    let with_empty_fields = builder.into_inner().unwrap();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append(&explicit, &b"moon\n"[..]).unwrap();
    let with_explicit_zeros = builder.into_inner().unwrap();

    // Both archives hash the same canonical field values.
    assert_eq!(sum_of(&with_empty_fields), sum_of(&with_explicit_zeros));
}

#[test]
fn test_large_entry_spans_chunks() {
    // Bigger than one internal chunk, not block aligned.
    let data = vec![0xa5u8; 100_000 + 37];
    let archive = build_tar(&[("big.bin", &data)]);

    let mut tarsum = TarSum::new(archive.as_slice(), false);
    let mut out = Vec::new();
    tarsum.read_to_end(&mut out).unwrap();

    assert_eq!(out, archive);
    assert!(tarsum.sum(b"").is_ok());
}

#[test]
fn test_truncated_archive_is_invalid_data() {
    let archive = build_tar(&[("a.txt", b"first")]);
    let truncated = &archive[..archive.len() - 700];

    let mut tarsum = TarSum::new(truncated, false);
    let mut out = Vec::new();
    let err = tarsum.read_to_end(&mut out).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn test_empty_archive() {
    let archive = build_tar(&[]);

    let mut tarsum = TarSum::new(archive.as_slice(), false);
    let mut out = Vec::new();
    tarsum.read_to_end(&mut out).unwrap();

    assert_eq!(out, archive);
    assert!(tarsum.sums().is_empty());
    assert!(tarsum.sum(b"").unwrap().starts_with("tarsum+sha256:"));
}
