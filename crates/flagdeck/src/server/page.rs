//! The reveal.js page wrapped around the live deck.
//!
//! The page renders the current slides once, then follows `/api/deck`: a new
//! fingerprint swaps the slide markup and resyncs reveal.js, and a new
//! server-side index navigates there. Hotkeys and indicator clicks go back
//! to the server, which owns all state.

use std::fmt::Write;

use crate::deck::escape_attr;
use crate::flags::FlagSet;

const TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{{title}}</title>
<link rel="stylesheet" href="/reveal.js/dist/reveal.css">
<link rel="stylesheet" href="/reveal.js/dist/theme/black.css">
<link rel="stylesheet" href="/static/css/flagdeck.css">
<style>
.flag-indicators { position: fixed; top: 20px; right: 20px; z-index: 1000; display: flex; gap: .5rem; }
.flag-indicator { cursor: pointer; padding: .3rem .7rem; border-radius: 4px; font: 14px sans-serif; color: #fff; }
.flag-indicator.active { background: #3dd6a3; }
.flag-indicator.inactive { background: #6b7280; }
.flag-notifications { position: fixed; top: 80px; right: 20px; z-index: 1001; }
.flag-notification { margin-bottom: .5rem; padding: 1rem 1.5rem; border-radius: 5px; color: #fff; font: 16px sans-serif; }
.flag-notification.enabled { background: #3dd6a3; }
.flag-notification.disabled { background: #6b7280; }
.highlighted { color: #3dd6a3; font-weight: bold; }
</style>
</head>
<body>
<div class="flag-indicators">
{{indicators}}</div>
<div class="flag-notifications"></div>
<div class="reveal">
<div class="slides">
{{slides}}</div>
</div>
<script src="/reveal.js/dist/reveal.js"></script>
<script>
(function () {
  var state = { fingerprint: "{{fingerprint}}", index: {{index}} };
  var hotkeys = {{hotkeys}};

  Reveal.initialize({ hash: true, controls: true, progress: true, center: true });
  Reveal.on('slidechanged', function (event) {
    console.log('Slide changed to: ' + event.indexh);
  });

  function post(path) {
    return fetch(path, { method: 'POST' }).then(refresh);
  }

  function render(deck) {
    if (deck.fingerprint !== state.fingerprint) {
      document.querySelector('.reveal .slides').innerHTML = deck.slides;
      Reveal.sync();
      state.fingerprint = deck.fingerprint;
    }
    if (deck.index !== state.index) {
      Reveal.slide(deck.index);
      state.index = deck.index;
    }
    Object.keys(deck.flags).forEach(function (key) {
      var on = deck.flags[key];
      var indicator = document.querySelector('[data-flag="' + key + '"]');
      if (indicator) {
        indicator.classList.toggle('active', on);
        indicator.classList.toggle('inactive', !on);
      }
      var highlight = document.getElementById(key.replace('{{suffix}}', '') + '-highlight');
      if (highlight) {
        highlight.classList.toggle('highlighted', on);
      }
    });
    var box = document.querySelector('.flag-notifications');
    box.innerHTML = '';
    deck.notifications.forEach(function (n) {
      var div = document.createElement('div');
      div.className = 'flag-notification ' + (n.enabled ? 'enabled' : 'disabled');
      div.textContent = n.message;
      box.appendChild(div);
    });
  }

  function refresh() {
    return fetch('/api/deck').then(function (r) { return r.json(); }).then(render)
      .catch(function (e) { console.warn('Deck refresh failed', e); });
  }

  document.addEventListener('keydown', function (event) {
    if (hotkeys.indexOf(event.keyCode) !== -1) {
      post('/api/keys/' + event.keyCode);
    }
  });
  document.querySelectorAll('[data-flag]').forEach(function (el) {
    el.addEventListener('click', function () {
      post('/api/flags/' + encodeURIComponent(el.dataset.flag) + '/toggle');
    });
  });

  setInterval(refresh, 1000);
  refresh();
})();
</script>
</body>
</html>
"##;

/// Render the full presentation page.
#[must_use]
pub fn render_page(
    title: &str,
    flags: &FlagSet,
    slides_html: &str,
    fingerprint: &str,
    index: usize,
) -> String {
    let mut indicators = String::new();
    for def in flags.iter() {
        let hint = def
            .hotkey
            .and_then(char::from_u32)
            .map(|c| format!(" ({c})"))
            .unwrap_or_default();
        let _ = writeln!(
            indicators,
            "<span class=\"flag-indicator inactive\" data-flag=\"{}\">{}{}</span>",
            escape_attr(&def.key),
            escape_attr(&def.name),
            escape_attr(&hint)
        );
    }
    let hotkeys: Vec<u32> = flags.iter().filter_map(|def| def.hotkey).collect();
    let hotkeys = serde_json::to_string(&hotkeys).unwrap_or_else(|_| "[]".to_string());

    TEMPLATE
        .replace("{{title}}", &escape_attr(title))
        .replace("{{indicators}}", &indicators)
        .replace("{{fingerprint}}", fingerprint)
        .replace("{{index}}", &index.to_string())
        .replace("{{hotkeys}}", &hotkeys)
        .replace("{{suffix}}", &escape_attr(flags.suffix()))
        .replace("{{slides}}", slides_html)
}
