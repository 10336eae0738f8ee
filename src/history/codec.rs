//! ログテキスト中のエスケープされたパス名と文字化けした作者名を復元するモジュール
//!
//! Gitは非ASCIIのパスを `\303\244` のような8進数エスケープの連続として出力し、
//! さらにパス全体をダブルクォートで囲みます。ここで提供する関数はどちらも
//! 全域関数で、入力が壊れていてもパニックせず元の文字列をそのまま返します。

/// `\ddd` 形式の8進数エスケープの連続をUTF-8として復号し、前後のクォートを取り除きます
///
/// # 引数
///
/// - `s`: ログから読み取った生のパス文字列
///
/// # 戻り値
///
/// 復号済みのパス。エスケープが不正な場合や復号結果がUTF-8として不正な場合は
/// 入力をそのまま返します。
pub fn decode_escaped_path(s: &str) -> String {
    let Some(decoded) = decode_octal_runs(s) else {
        return s.to_string();
    };

    let unquoted = decoded.strip_prefix('"').unwrap_or(&decoded);
    let unquoted = unquoted.strip_suffix('"').unwrap_or(unquoted);
    unquoted.to_string()
}

fn decode_octal_runs(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            out.push(u8::try_from(value).ok()?);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).ok()
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|b| (b'0'..=b'7').contains(b))
}

/// Windows-1252で0x80〜0x9Fに割り当てられている文字
///
/// 添字 + 0x80 がそのバイト値です。未定義の位置は `None` です。
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

fn cp1252_byte(c: char) -> Option<u8> {
    let code = u32::from(c);
    if code < 0x80 || (0xA0..=0xFF).contains(&code) {
        return u8::try_from(code).ok();
    }
    CP1252_HIGH
        .iter()
        .position(|candidate| *candidate == Some(c))
        .and_then(|index| u8::try_from(index + 0x80).ok())
}

/// UTF-8のバイト列がWindows-1252として解釈されてしまった文字列を元に戻します
///
/// 主にコミット作成者名の文字化け（例: `JosÃ©` → `José`）の修復に使います。
/// パスの復号とは独立した処理です。
///
/// # 戻り値
///
/// 修復後の文字列。1252に存在しない文字を含む場合や、再構成したバイト列が
/// UTF-8として不正な場合は入力をそのまま返します。
pub fn decode_misencoded_utf8(s: &str) -> String {
    let bytes: Option<Vec<u8>> = s.chars().map(cp1252_byte).collect();
    bytes
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_escaped_path() {
        let test_cases = [
            ("src/main.rs", "src/main.rs"),
            ("\"\\303\\244pfel.txt\"", "äpfel.txt"),
            ("\"docs/\\346\\227\\245\\346\\234\\254.md\"", "docs/日本.md"),
            ("\"a\\303\\244b\\303\\266c\"", "aäböc"),
            ("\"quoted.txt\"", "quoted.txt"),
        ];

        for (input, expected) in test_cases {
            assert_eq!(decode_escaped_path(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_decode_escaped_path_is_noop_on_malformed_input() {
        // 不完全なUTF-8シーケンス（先頭バイトのみ）
        assert_eq!(decode_escaped_path("\\303"), "\\303");
        assert_eq!(decode_escaped_path("x\\303y"), "x\\303y");
        // 8進数として範囲外
        assert_eq!(decode_escaped_path("\\777"), "\\777");
        // 末尾で途切れたエスケープ
        assert_eq!(decode_escaped_path("abc\\30"), "abc\\30");
        // クォートされたパスも、復号できなければクォートごと残す
        assert_eq!(decode_escaped_path("\"dir/\\303\""), "\"dir/\\303\"");
    }

    #[test]
    fn test_decode_misencoded_utf8() {
        assert_eq!(decode_misencoded_utf8("JosÃ©"), "José");
        assert_eq!(decode_misencoded_utf8("MÃ¼ller"), "Müller");
        assert_eq!(decode_misencoded_utf8("plain ascii"), "plain ascii");
        // 1252の特殊領域（0x80〜0x9F）を経由する文字: '€' は E2 82 AC
        assert_eq!(decode_misencoded_utf8("â‚¬"), "€");
    }

    #[test]
    fn test_decode_misencoded_utf8_keeps_correct_text() {
        // 正しいUTF-8はバイト列に戻すと不正になるため変更されない
        assert_eq!(decode_misencoded_utf8("José"), "José");
        assert_eq!(decode_misencoded_utf8("山田"), "山田");
    }
}
