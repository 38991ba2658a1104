// Copyright (c) 2025 [WXRIW]
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! QRC 使用的 DES 分组密码。
//!
//! **注意**：S-盒与标准 DES 有细微差异 (SBOX2、SBOX4)，密钥编排中 D 半部分的位索引也有偏移。
//! 这些差异必须原样保留，否则无法解密 QQ 音乐的歌词。本实现不具备任何安全性。

const ROUNDS: usize = 16;
const SUB_KEY_SIZE: usize = 6;
pub const BLOCK_SIZE: usize = 8;

/// 16 轮子密钥，每轮 48 位。
pub type KeySchedule = [[u8; SUB_KEY_SIZE]; ROUNDS];

/// 加密或解密方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Encrypt,
    Decrypt,
}

#[rustfmt::skip]
const SBOXES: [[u8; 64]; 8] = [
    [
        14, 4, 13, 1, 2, 15, 11, 8, 3, 10, 6, 12, 5, 9, 0, 7,
        0, 15, 7, 4, 14, 2, 13, 1, 10, 6, 12, 11, 9, 5, 3, 8,
        4, 1, 14, 8, 13, 6, 2, 11, 15, 12, 9, 7, 3, 10, 5, 0,
        15, 12, 8, 2, 4, 9, 1, 7, 5, 11, 3, 14, 10, 0, 6, 13,
    ],
    [
        15, 1, 8, 14, 6, 11, 3, 4, 9, 7, 2, 13, 12, 0, 5, 10,
        3, 13, 4, 7, 15, 2, 8, 15, 12, 0, 1, 10, 6, 9, 11, 5,
        0, 14, 7, 11, 10, 4, 13, 1, 5, 8, 12, 6, 9, 3, 2, 15,
        13, 8, 10, 1, 3, 15, 4, 2, 11, 6, 7, 12, 0, 5, 14, 9,
    ],
    [
        10, 0, 9, 14, 6, 3, 15, 5, 1, 13, 12, 7, 11, 4, 2, 8,
        13, 7, 0, 9, 3, 4, 6, 10, 2, 8, 5, 14, 12, 11, 15, 1,
        13, 6, 4, 9, 8, 15, 3, 0, 11, 1, 2, 12, 5, 10, 14, 7,
        1, 10, 13, 0, 6, 9, 8, 7, 4, 15, 14, 3, 11, 5, 2, 12,
    ],
    [
        7, 13, 14, 3, 0, 6, 9, 10, 1, 2, 8, 5, 11, 12, 4, 15,
        13, 8, 11, 5, 6, 15, 0, 3, 4, 7, 2, 12, 1, 10, 14, 9,
        10, 6, 9, 0, 12, 11, 7, 13, 15, 1, 3, 14, 5, 2, 8, 4,
        3, 15, 0, 6, 10, 10, 13, 8, 9, 4, 5, 11, 12, 7, 2, 14,
    ],
    [
        2, 12, 4, 1, 7, 10, 11, 6, 8, 5, 3, 15, 13, 0, 14, 9,
        14, 11, 2, 12, 4, 7, 13, 1, 5, 0, 15, 10, 3, 9, 8, 6,
        4, 2, 1, 11, 10, 13, 7, 8, 15, 9, 12, 5, 6, 3, 0, 14,
        11, 8, 12, 7, 1, 14, 2, 13, 6, 15, 0, 9, 10, 4, 5, 3,
    ],
    [
        12, 1, 10, 15, 9, 2, 6, 8, 0, 13, 3, 4, 14, 7, 5, 11,
        10, 15, 4, 2, 7, 12, 9, 5, 6, 1, 13, 14, 0, 11, 3, 8,
        9, 14, 15, 5, 2, 8, 12, 3, 7, 0, 4, 10, 1, 13, 11, 6,
        4, 3, 2, 12, 9, 5, 15, 10, 11, 14, 1, 7, 6, 0, 8, 13,
    ],
    [
        4, 11, 2, 14, 15, 0, 8, 13, 3, 12, 9, 7, 5, 10, 6, 1,
        13, 0, 11, 7, 4, 9, 1, 10, 14, 3, 5, 12, 2, 15, 8, 6,
        1, 4, 11, 13, 12, 3, 7, 14, 10, 15, 6, 8, 0, 5, 9, 2,
        6, 11, 13, 8, 1, 4, 10, 7, 9, 5, 0, 15, 14, 2, 3, 12,
    ],
    [
        13, 2, 8, 4, 6, 15, 11, 1, 10, 9, 3, 14, 5, 0, 12, 7,
        1, 15, 13, 8, 10, 3, 7, 4, 12, 5, 6, 11, 0, 14, 9, 2,
        7, 11, 4, 1, 9, 12, 14, 2, 0, 6, 10, 13, 15, 3, 5, 8,
        2, 1, 14, 7, 4, 10, 8, 13, 15, 12, 9, 0, 3, 5, 6, 11,
    ],
];

const KEY_ROUND_SHIFT: [u32; ROUNDS] = [1, 1, 2, 2, 2, 2, 2, 2, 1, 2, 2, 2, 2, 2, 2, 1];

#[rustfmt::skip]
const KEY_PERM_C: [usize; 28] = [
    56, 48, 40, 32, 24, 16, 8, 0, 57, 49, 41, 33, 25, 17,
    9, 1, 58, 50, 42, 34, 26, 18, 10, 2, 59, 51, 43, 35,
];

#[rustfmt::skip]
const KEY_PERM_D: [usize; 28] = [
    62, 54, 46, 38, 30, 22, 14, 6, 61, 53, 45, 37, 29, 21,
    13, 5, 60, 52, 44, 36, 28, 20, 12, 4, 27, 19, 11, 3,
];

#[rustfmt::skip]
const KEY_COMPRESSION: [usize; 48] = [
    13, 16, 10, 23, 0, 4, 2, 27, 14, 5, 20, 9, 22, 18, 11, 3,
    25, 7, 15, 6, 26, 19, 12, 1, 40, 51, 30, 36, 46, 54, 29, 39,
    50, 44, 32, 47, 43, 48, 38, 55, 33, 52, 45, 41, 49, 35, 28, 31,
];

/// 初始置换左半部分的源位，右半部分为每项减一。
#[rustfmt::skip]
const IP_LEFT: [usize; 32] = [
    57, 49, 41, 33, 25, 17, 9, 1, 59, 51, 43, 35, 27, 19, 11, 3,
    61, 53, 45, 37, 29, 21, 13, 5, 63, 55, 47, 39, 31, 23, 15, 7,
];

/// 逆初始置换：(输出字节下标, 起始位)。
const INV_IP_ORDER: [(usize, usize); 8] = [
    (3, 7),
    (2, 6),
    (1, 5),
    (0, 4),
    (7, 3),
    (6, 2),
    (5, 1),
    (4, 0),
];

#[rustfmt::skip]
const P_PERM: [usize; 32] = [
    15, 6, 19, 20, 28, 11, 27, 16, 0, 14, 22, 25, 4, 17, 30, 9,
    1, 7, 23, 13, 31, 26, 2, 8, 18, 12, 29, 5, 21, 10, 3, 24,
];

/// 取字节数组中第 `b` 位 (按 32 位小端分组，组内从高位数)，放到结果的第 `c` 位。
const fn bit_num(a: &[u8], b: usize, c: usize) -> u32 {
    (((a[b / 32 * 4 + 3 - b % 32 / 8] >> (7 - (b % 8))) & 0x01) as u32) << c
}

/// 取 `a` 从高位数的第 `b` 位，放到字节的第 `c` 位。
const fn bit_num_intr(a: u32, b: usize, c: usize) -> u8 {
    (((a >> (31 - b)) & 0x01) << c) as u8
}

const fn bit_num_intl(a: u32, b: usize, c: usize) -> u32 {
    ((a << b) & 0x8000_0000) >> c
}

/// 把 6 位输入重排成 S-盒表的行列布局。
const fn sbox_bit(a: u8) -> usize {
    ((a & 0x20) | ((a & 0x1f) >> 1) | ((a & 0x01) << 4)) as usize
}

/// 生成 16 轮子密钥。解密模式下子密钥倒序存放。
pub fn key_schedule(key: &[u8; BLOCK_SIZE], mode: Mode) -> KeySchedule {
    let mut schedule = [[0u8; SUB_KEY_SIZE]; ROUNDS];

    let mut c = 0u32;
    let mut d = 0u32;
    for (i, &perm) in KEY_PERM_C.iter().enumerate() {
        c |= bit_num(key, perm, 31 - i);
    }
    for (i, &perm) in KEY_PERM_D.iter().enumerate() {
        d |= bit_num(key, perm, 31 - i);
    }

    for (round, &shift) in KEY_ROUND_SHIFT.iter().enumerate() {
        c = ((c << shift) | (c >> (28 - shift))) & 0xffff_fff0;
        d = ((d << shift) | (d >> (28 - shift))) & 0xffff_fff0;

        let target = match mode {
            Mode::Decrypt => ROUNDS - 1 - round,
            Mode::Encrypt => round,
        };
        let sub_key = &mut schedule[target];

        for (j, &comp) in KEY_COMPRESSION.iter().enumerate() {
            // D 半部分的索引偏移 27 而不是 28
            let bit = if j < 24 {
                bit_num_intr(c, comp, 7 - (j % 8))
            } else {
                bit_num_intr(d, comp - 27, 7 - (j % 8))
            };
            sub_key[j / 8] |= bit;
        }
    }

    schedule
}

fn initial_permutation(input: &[u8; BLOCK_SIZE]) -> [u32; 2] {
    let mut state = [0u32; 2];
    for (i, &src) in IP_LEFT.iter().enumerate() {
        state[0] |= bit_num(input, src, 31 - i);
        state[1] |= bit_num(input, src - 1, 31 - i);
    }
    state
}

fn inverse_permutation(state: &[u32; 2]) -> [u8; BLOCK_SIZE] {
    let mut output = [0u8; BLOCK_SIZE];
    for &(out_idx, base) in &INV_IP_ORDER {
        let mut byte = 0u8;
        for k in 0..4 {
            let src = base + 8 * k;
            byte |= bit_num_intr(state[1], src, 7 - 2 * k);
            byte |= bit_num_intr(state[0], src, 6 - 2 * k);
        }
        output[out_idx] = byte;
    }
    output
}

/// Feistel 轮函数：扩展、与子密钥异或、S-盒代换、P 置换。
fn feistel(state: u32, key: &[u8; SUB_KEY_SIZE]) -> u32 {
    let t1 = bit_num_intl(state, 31, 0)
        | ((state & 0xf000_0000) >> 1)
        | bit_num_intl(state, 4, 5)
        | bit_num_intl(state, 3, 6)
        | ((state & 0x0f00_0000) >> 3)
        | bit_num_intl(state, 8, 11)
        | bit_num_intl(state, 7, 12)
        | ((state & 0x00f0_0000) >> 5)
        | bit_num_intl(state, 12, 17)
        | bit_num_intl(state, 11, 18)
        | ((state & 0x000f_0000) >> 7)
        | bit_num_intl(state, 16, 23);

    let t2 = bit_num_intl(state, 15, 0)
        | ((state & 0x0000_f000) << 15)
        | bit_num_intl(state, 20, 5)
        | bit_num_intl(state, 19, 6)
        | ((state & 0x0000_0f00) << 13)
        | bit_num_intl(state, 24, 11)
        | bit_num_intl(state, 23, 12)
        | ((state & 0x0000_00f0) << 11)
        | bit_num_intl(state, 28, 17)
        | bit_num_intl(state, 27, 18)
        | ((state & 0x0000_000f) << 9)
        | bit_num_intl(state, 0, 23);

    let mut expanded = [
        (t1 >> 24) as u8,
        (t1 >> 16) as u8,
        (t1 >> 8) as u8,
        (t2 >> 24) as u8,
        (t2 >> 16) as u8,
        (t2 >> 8) as u8,
    ];
    for (byte, k) in expanded.iter_mut().zip(key) {
        *byte ^= k;
    }

    let groups = [
        expanded[0] >> 2,
        ((expanded[0] & 0x03) << 4) | (expanded[1] >> 4),
        ((expanded[1] & 0x0f) << 2) | (expanded[2] >> 6),
        expanded[2] & 0x3f,
        expanded[3] >> 2,
        ((expanded[3] & 0x03) << 4) | (expanded[4] >> 4),
        ((expanded[4] & 0x0f) << 2) | (expanded[5] >> 6),
        expanded[5] & 0x3f,
    ];

    let mut substituted = 0u32;
    for (i, &group) in groups.iter().enumerate() {
        substituted |= (SBOXES[i][sbox_bit(group)] as u32) << ((7 - i) * 4);
    }

    P_PERM
        .iter()
        .enumerate()
        .fold(0u32, |acc, (k, &src)| acc | bit_num_intl(substituted, src, k))
}

/// 加密或解密单个 8 字节分组，方向由子密钥顺序决定。
pub fn crypt_block(input: &[u8; BLOCK_SIZE], schedule: &KeySchedule) -> [u8; BLOCK_SIZE] {
    let mut state = initial_permutation(input);

    for sub_key in schedule.iter().take(ROUNDS - 1) {
        let t = state[1];
        state[1] = feistel(state[1], sub_key) ^ state[0];
        state[0] = t;
    }
    // 最后一轮不交换
    state[0] ^= feistel(state[1], &schedule[ROUNDS - 1]);

    inverse_permutation(&state)
}

fn process_chunks(data: &[u8], key: &[u8; BLOCK_SIZE], mode: Mode) -> Vec<u8> {
    let schedule = key_schedule(key, mode);
    let mut output = Vec::with_capacity(data.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE);
    for chunk in data.chunks(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block[..chunk.len()].copy_from_slice(chunk);
        output.extend_from_slice(&crypt_block(&block, &schedule));
    }
    output
}

/// ECB 处理任意长度数据。末尾不足一个分组时补零，输出截断回输入长度。
pub fn des_process(data: &[u8], key: &[u8; BLOCK_SIZE], mode: Mode) -> Vec<u8> {
    let mut output = process_chunks(data, key, mode);
    output.truncate(data.len());
    output
}

/// ECB 处理任意长度数据，总是输出完整的 8 字节对齐结果。仅用于生成。
pub fn des_process_aligned(data: &[u8], key: &[u8; BLOCK_SIZE], mode: Mode) -> Vec<u8> {
    process_chunks(data, key, mode)
}

/// 取 UTF-8 字节的前 8 字节作为 DES 密钥，不足时补零。
pub fn key_from_str(key: &str) -> [u8; BLOCK_SIZE] {
    let mut out = [0u8; BLOCK_SIZE];
    for (dst, src) in out.iter_mut().zip(key.as_bytes()) {
        *dst = *src;
    }
    out
}
