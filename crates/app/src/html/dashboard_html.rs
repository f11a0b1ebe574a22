pub const DASHBOARD_INDEX_HTML: &str = r#"
<!doctype html>
<html lang="en">

<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>Stadium Pulse</title>
  <style>
    :root {
      --bg: #f1f5f9;
      --panel: #ffffff;
      --ink: #0f172a;
      --muted: #64748b;
      --accent: #38bdf8;
      --safe: #16a34a;
      --warning: #ea580c;
      --critical: #dc2626;
    }

    * { box-sizing: border-box; }

    body {
      margin: 0;
      font-family: ui-sans-serif, system-ui, -apple-system, "Segoe UI", sans-serif;
      background: var(--bg);
      color: var(--ink);
    }

    header {
      display: flex;
      align-items: center;
      justify-content: space-between;
      padding: 16px 24px;
      background: var(--ink);
      color: #fff;
    }

    header h1 { margin: 0; font-size: 20px; letter-spacing: 0.04em; }

    #link {
      font-size: 13px;
      padding: 4px 10px;
      border-radius: 999px;
      background: #334155;
    }

    #link.online { background: var(--safe); }
    #link.offline { background: var(--critical); }

    main {
      display: grid;
      grid-template-columns: minmax(0, 2fr) minmax(0, 1fr);
      gap: 20px;
      padding: 20px 24px;
    }

    .panel {
      background: var(--panel);
      border-radius: 12px;
      padding: 16px;
      box-shadow: 0 1px 3px rgba(15, 23, 42, 0.12);
    }

    .panel h2 { margin: 0 0 12px; font-size: 15px; text-transform: uppercase; color: var(--muted); }

    #heatmap { width: 100%; border-radius: 8px; display: block; background: var(--bg); }

    .stats { display: grid; grid-template-columns: repeat(2, 1fr); gap: 10px; }
    .stat { background: var(--bg); border-radius: 8px; padding: 10px; }
    .stat .label { font-size: 12px; color: var(--muted); }
    .stat .value { font-size: 22px; font-weight: 700; }

    table { width: 100%; border-collapse: collapse; font-size: 14px; }
    th, td { text-align: left; padding: 6px 4px; border-bottom: 1px solid #e2e8f0; }
    td.status-SAFE { color: var(--safe); font-weight: 600; }
    td.status-WARNING { color: var(--warning); font-weight: 600; }
    td.status-CRITICAL { color: var(--critical); font-weight: 600; }

    .control { display: flex; gap: 6px; }
    .control input { width: 80px; padding: 4px; }
    .control button {
      border: 0;
      border-radius: 6px;
      padding: 4px 8px;
      cursor: pointer;
      background: var(--accent);
      color: var(--ink);
    }
    .control button.auto { background: #e2e8f0; }

    #error { color: var(--critical); font-size: 13px; min-height: 18px; }
    a { color: var(--accent); }
  </style>
</head>

<body>
  <header>
    <h1>STADIUM PULSE</h1>
    <span id="link">connecting</span>
  </header>

  <main>
    <section class="panel">
      <h2>Crowd heatmap</h2>
      <img id="heatmap" src="/heatmap.png" alt="Crowd density heatmap" />
      <p><a href="/video_feed" target="_blank" rel="noopener">Open live camera feed</a></p>
    </section>

    <section>
      <div class="panel">
        <h2>Overview</h2>
        <div class="stats">
          <div class="stat"><div class="label">Fans in venue</div><div class="value" id="total">-</div></div>
          <div class="stat"><div class="label">Global status</div><div class="value" id="global">-</div></div>
          <div class="stat"><div class="label">Eco zones</div><div class="value" id="eco">-</div></div>
          <div class="stat"><div class="label">Health</div><div class="value" id="health">-</div></div>
        </div>
        <p id="error"></p>
      </div>

      <div class="panel" style="margin-top: 20px;">
        <h2>Zones</h2>
        <table>
          <thead>
            <tr><th>Zone</th><th>Count</th><th>Price</th><th>Status</th><th>Pricing</th></tr>
          </thead>
          <tbody id="zones"></tbody>
        </table>
      </div>
    </section>
  </main>

  <script>
    const el = (id) => document.getElementById(id);
    let lastFrameRevision = null;

    function renderState(state) {
      const link = el('link');
      link.textContent = state.connectivity.connected ? 'live' : 'offline';
      link.className = state.connectivity.connected ? 'online' : 'offline';
      el('error').textContent = state.connectivity.error || '';

      el('total').textContent = state.total_count;
      el('global').textContent = state.global_status;
      el('eco').textContent = state.summary.eco_zones + ' / ' + state.summary.zones;
      el('health').textContent = state.summary.health_percent + '%';

      const rows = state.zones.map((zone) => `
        <tr>
          <td>${zone.name}</td>
          <td>${zone.count}</td>
          <td>$${zone.price.toFixed(2)}${zone.manual ? ' (manual)' : ''}</td>
          <td class="status-${zone.status}">${zone.status}</td>
          <td>
            <div class="control">
              <input type="number" min="0" step="0.5" data-zone="${zone.name}" placeholder="${zone.price.toFixed(2)}" />
              <button data-set="${zone.name}">Set</button>
              <button class="auto" data-auto="${zone.name}">Auto</button>
            </div>
          </td>
        </tr>`);
      el('zones').innerHTML = rows.join('');

      if (lastFrameRevision !== state.revision) {
        lastFrameRevision = state.revision;
        el('heatmap').src = '/heatmap.png?rev=' + state.revision;
      }
    }

    async function send(url, body) {
      const response = await fetch(url, {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: body ? JSON.stringify(body) : null,
      });
      if (!response.ok) {
        const payload = await response.json().catch(() => ({}));
        el('error').textContent = payload.error || ('HTTP ' + response.status);
      }
    }

    el('zones').addEventListener('click', (event) => {
      const target = event.target;
      if (target.dataset.set) {
        const zone = target.dataset.set;
        const input = document.querySelector(`input[data-zone="${zone}"]`);
        const price = Number.parseFloat(input.value);
        if (!Number.isFinite(price) || price < 0) {
          el('error').textContent = 'Price must be a number >= 0';
          return;
        }
        send(`/api/zones/${encodeURIComponent(zone)}/price`, { price });
      } else if (target.dataset.auto) {
        send(`/api/zones/${encodeURIComponent(target.dataset.auto)}/auto`);
      }
    });

    const events = new EventSource('/stream_state');
    events.onmessage = (message) => renderState(JSON.parse(message.data));
    events.onerror = () => {
      el('link').textContent = 'reconnecting';
      el('link').className = '';
    };
  </script>
</body>

</html>
"#;
