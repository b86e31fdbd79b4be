//! Include-file constants and whole-file assembly layout.

use pentlyas::mml::{render_asm, render_inc, Compiler, OutputOptions, Region};

const ALBUM: &str = "\
title Demo Album
author Someone
copyright 2019 Someone
sfx ding on pulse
volume 8 4
song intro
title Opening
mute triangle
at 3
mark chorus
fine
song loop
segno
at 2
mark bridge
resume bridge
dal segno
";

// ============================================================
// Include file
// ============================================================

#[test]
fn inc_lists_songs_and_sounds() {
    let music = Compiler::compile(ALBUM, "album.pently").unwrap();
    let inc = render_inc(&music);
    assert!(inc.contains(".ifndef PENTLY_MUSIC_INC\n"));
    assert!(inc.contains("NUM_SONGS = 2\nNUM_SOUNDS = 1\n"));
    assert!(inc.contains("SFX_ding = 0"));
    assert!(inc.contains("SONG_intro = 0\nPSMUTE_intro = $04\nPSMARK_intro_chorus = 32\n"));
    assert!(inc.contains("SONG_loop = 1\nPSMARK_loop_bridge = 16\n"));
    assert!(inc.trim_end().ends_with(".endif"));
}

#[test]
fn inc_has_resume_point() {
    let music = Compiler::compile(ALBUM, "album.pently").unwrap();
    let inc = render_inc(&music);
    assert!(inc.contains("PENTLY_RESUME_SONG = 1\nPENTLY_RESUME_ROWS = 16\nPENTLY_RESUME_MUTE = $00\n"));
}

#[test]
fn inc_has_metadata_strings() {
    let music = Compiler::compile(ALBUM, "album.pently").unwrap();
    let inc = render_inc(&music);
    assert!(inc.contains(".define PENTLY_TITLE \"Demo Album\""));
    assert!(inc.contains(".define PENTLY_COPYRIGHT \"2019 Someone\""));
    assert!(inc.contains(".define PENTLY_SONG_TITLES \"Opening\", \"loop\""));
    assert!(inc.contains(".define PENTLY_SONG_AUTHORS \"Someone\", \"Someone\""));
}

#[test]
fn inc_without_songs_has_no_song_lists() {
    let music = Compiler::compile("sfx ding on pulse\nvolume 8", "sfx.pently").unwrap();
    let inc = render_inc(&music);
    assert!(!inc.contains("PENTLY_SONG_TITLES"));
    assert!(!inc.contains("PENTLY_RESUME_SONG"));
}

// ============================================================
// Assembly file
// ============================================================

#[test]
fn asm_header_names_source_and_segment() {
    let music = Compiler::compile(ALBUM, "album.pently").unwrap();
    let opts = OutputOptions {
        segment: "MUSIC".to_string(),
        source_name: "album.pently".to_string(),
        ..OutputOptions::default()
    };
    let out = render_asm(Some(&music), &opts);
    assert!(out.starts_with("; Generated using Pently music assembler\n"));
    assert!(out.contains("; Music from album.pently\n"));
    assert!(out.contains(".include \"pentlyseq.inc\"\n"));
    assert!(out.contains(".segment \"MUSIC\"\n"));
    assert!(out.contains("NUM_SONGS=2\nNUM_SOUNDS=1\n"));
    assert!(out.contains("; Total music data size: "));
}

#[test]
fn asm_appends_period_table() {
    let music = Compiler::compile(ALBUM, "album.pently").unwrap();
    let opts = OutputOptions {
        periods: 12,
        region: Region::Pal,
        ..OutputOptions::default()
    };
    let out = render_asm(Some(&music), &opts);
    assert!(out.contains("periodTableLo"));
    assert!(out.contains("periodTableHi"));
}
